use std::ascii;
use std::fmt;
use std::str::FromStr;

/// How a collision is rendered as one line of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Escaped byte string literal, e.g. `b"\x15\xa0k"`
    #[default]
    Bytes,
    /// Lowercase hex, e.g. `15a06b`
    Hex,
    /// C-style byte array, e.g. `{0x15, 0xa0, 0x6b}`
    CArray,
}

impl OutputFormat {
    pub fn render(&self, collision: &[u8]) -> String {
        match self {
            OutputFormat::Bytes => {
                let escaped: String = collision
                    .iter()
                    .flat_map(|&b| ascii::escape_default(b))
                    .map(char::from)
                    .collect();
                format!("b\"{}\"", escaped)
            }
            OutputFormat::Hex => hex::encode(collision),
            OutputFormat::CArray => {
                let items: Vec<String> = collision.iter().map(|b| format!("0x{:02x}", b)).collect();
                format!("{{{}}}", items.join(", "))
            }
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytes" => Ok(OutputFormat::Bytes),
            "hex" => Ok(OutputFormat::Hex),
            "c" => Ok(OutputFormat::CArray),
            other => Err(format!("unknown format '{}', expected one of: c, hex, bytes", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Bytes => "bytes",
            OutputFormat::Hex => "hex",
            OutputFormat::CArray => "c",
        };
        f.write_str(name)
    }
}
