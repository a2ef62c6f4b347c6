//! ANSI escape stripping for relayed console output.

use std::sync::LazyLock;

use regex::Regex;

/// CSI and OSC sequences, introduced by ESC or the 8-bit CSI byte.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[\x1b\x{9b}][\[\]()#;?]*",
        r"(?:(?:(?:[a-zA-Z\d]*(?:;[-a-zA-Z\d/#&.:=?%@~_]*)*)?\x07)",
        r"|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PR-TZcf-ntqry=><~]))",
    ))
    .expect("valid regex")
});

pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}
