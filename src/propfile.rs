// Property File Parser
// Parses simple key=value property files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// One `key = value` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    /// 1-based line number
    pub line: usize,
    pub key: &'a str,
    pub value: &'a str,
}

/// Parse property file text.
///
/// Keys keep their case. Whitespace around keys and values is trimmed and
/// `#` starts a comment anywhere on a line. Malformed lines are skipped
/// with a warning.
pub fn parse_propfile(data: &str) -> impl Iterator<Item = Property<'_>> {
    data.lines().enumerate().filter_map(|(index, raw)| {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            return None;
        }

        let Some((key, value)) = content.split_once('=') else {
            log::warn!("line {}: key without value", line);
            return None;
        };
        let key = key.trim();
        if key.is_empty() {
            log::warn!("line {}: value without key", line);
            return None;
        }
        Some(Property {
            line,
            key,
            value: value.trim(),
        })
    })
}

/// Read `path` into memory for [`parse_propfile`]
pub fn read_propfile(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read property file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect(data: &str) -> Vec<(usize, &str, &str)> {
        parse_propfile(data)
            .map(|p| (p.line, p.key, p.value))
            .collect()
    }

    #[test]
    fn test_basic_pairs() {
        assert_eq!(
            collect("volume = 80\npan=63\n"),
            vec![(1, "volume", "80"), (2, "pan", "63")]
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let data = "# header\n\n  driver = none # trailing\n#volume=1\n";
        assert_eq!(collect(data), vec![(3, "driver", "none")]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let data = "bare\n= 3\nseek=250\n";
        assert_eq!(collect(data), vec![(3, "seek", "250")]);
    }

    #[test]
    fn test_empty_value_kept() {
        assert_eq!(collect("logfile =\n"), vec![(1, "logfile", "")]);
    }

    #[test]
    fn test_key_case_preserved() {
        assert_eq!(collect("LogLevel=debug"), vec![(1, "LogLevel", "debug")]);
    }

    #[test]
    fn test_read_propfile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"pan = 10\n").unwrap();
        file.flush().unwrap();
        let text = read_propfile(file.path()).unwrap();
        assert_eq!(collect(&text), vec![(1, "pan", "10")]);
        assert!(read_propfile(Path::new("/nonexistent/sndstream.cfg")).is_err());
    }
}
