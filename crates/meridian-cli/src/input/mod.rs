pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Deserialize a command input from `--input <path>` or, failing that, piped stdin.
pub fn read_input<T: DeserializeOwned>(path: Option<&str>, what: &str) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_document(path);
    }
    stdin::read_stdin(what)?
        .ok_or_else(|| format!("--input <file.json|file.yaml> or stdin required for {}", what).into())
}
