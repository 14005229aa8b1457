#[cfg(feature = "tokio-postgres")]
pub(crate) mod postgres;
