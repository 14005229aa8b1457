pub(in crate::r#async::backend) mod error;
