use serde::de::DeserializeOwned;
use std::error::Error;
use std::io::{self, Read};

/// Piped request document for the `what` command, deserialized straight
/// into its input type. None when stdin is a terminal or carries nothing.
pub fn read_stdin<T: DeserializeOwned>(what: &str) -> Result<Option<T>, Box<dyn Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().lock().read_to_string(&mut buffer)?;
    parse_document(&buffer, what)
}

/// A document opening with `{` is JSON; anything else is read as YAML.
fn parse_document<T: DeserializeOwned>(text: &str, what: &str) -> Result<Option<T>, Box<dyn Error>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let parsed = if text.starts_with('{') {
        serde_json::from_str(text).map_err(|e| format!("Invalid {} request on stdin: {}", what, e))?
    } else {
        serde_yaml::from_str(text).map_err(|e| format!("Invalid {} request on stdin: {}", what, e))?
    };
    Ok(Some(parsed))
}
