//! Output formatting

use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for automation
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `major.minor.micro` from a packed plugin version
pub fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

/// Four-character code when the id spells one, hex otherwise
pub fn format_unique_id(id: i64) -> String {
    let bytes = (id as u32).to_be_bytes();
    if (0..=u32::MAX as i64).contains(&id) && bytes.iter().all(|b| b.is_ascii_graphic()) {
        format!("'{}'", bytes.iter().map(|&b| b as char).collect::<String>())
    } else {
        format!("{:#x}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(0x10203), "1.2.3");
        assert_eq!(format_version(0), "0.0.0");
    }

    #[test]
    fn test_format_unique_id() {
        assert_eq!(format_unique_id(0x48697048), "'HipH'");
        assert_eq!(format_unique_id(7), "0x7");
        assert_eq!(format_unique_id(0x1_0000_0000), "0x100000000");
    }
}
