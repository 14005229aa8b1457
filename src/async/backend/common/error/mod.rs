pub(in crate::r#async::backend) mod tokio_postgres;
