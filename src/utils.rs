use std::fs;
use std::time::Duration;

/// Create an OSC8 file:// hyperlink for terminal output
pub fn osc8_file_link(path: &str, text: &str) -> String {
    let abs_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());
    format!("\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\", abs_path, text)
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Catalog paths from a sections file: one per line, `;` starts a comment
pub fn parse_sections(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split(';').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_parse_sections() {
        let content = "\
; pressure gauges
/catalog/mekh/tochnye/dif/

  /catalog/mekh/tochnye/vacuum/   ; vacuum
;/catalog/disabled/
";
        assert_eq!(
            parse_sections(content),
            vec!["/catalog/mekh/tochnye/dif/", "/catalog/mekh/tochnye/vacuum/"]
        );
    }

    #[test]
    fn test_file_link_falls_back_to_given_path() {
        let link = osc8_file_link("does/not/exist.csv", "products.csv");
        assert!(link.contains("file://does/not/exist.csv"));
        assert!(link.contains("products.csv"));
    }
}
