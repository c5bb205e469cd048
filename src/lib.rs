use tracing::warn;

pub mod config;
pub mod convert;
pub mod fetch;
pub mod output;
pub mod vatspy;

/// Decodes UTF-8, falling back to Windows-1252 which maps every byte.
fn read_to_string(contents: &[u8]) -> String {
    String::from_utf8(contents.to_vec()).unwrap_or_else(|_| {
        let (string, _, errors) = encoding_rs::WINDOWS_1252.decode(contents);
        if errors {
            warn!("errors while decoding win-1252");
        }
        string.into_owned()
    })
}

#[cfg(test)]
fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "{}-{}-{name}",
        env!("CARGO_PKG_NAME"),
        std::process::id()
    ));
    if dir.exists() {
        fs_err::remove_dir_all(&dir).unwrap();
    }
    fs_err::create_dir_all(&dir).unwrap();
    dir
}
