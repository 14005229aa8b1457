/// Quotes an SQL identifier, doubling embedded quotes
#[cfg_attr(not(feature = "tokio-postgres"), allow(dead_code))]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
