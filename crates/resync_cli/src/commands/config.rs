//! Configuration commands.

use resync::LayerConfig;
use std::io::Write;

use super::{CommandResult, OutputFormat};

/// Prints the resolved configuration, defaults included.
///
/// Loading already validated it; reaching this point means it is usable.
pub fn check(config: &LayerConfig, format: OutputFormat, out: &mut dyn Write) -> CommandResult {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(config)?)?,
        OutputFormat::Text => {
            write!(out, "{}", config.to_yaml()?)?;
            writeln!(out, "# configuration is valid")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_defaults_as_yaml() {
        let mut out = Vec::new();
        check(&LayerConfig::default(), OutputFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("max_size_mb: 100"));
        assert!(text.contains("cleanup_threshold: 0.8"));
        assert!(text.ends_with("# configuration is valid\n"));
    }

    #[test]
    fn prints_json() {
        let mut out = Vec::new();
        check(&LayerConfig::default(), OutputFormat::Json, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["retry"]["strategy"], "exponential");
        assert_eq!(parsed["cache"]["default_ttl_seconds"], 3600);
    }
}
