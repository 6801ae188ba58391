//! Terminal utility functions

/// Format a URL as a clickable terminal hyperlink if supported.
///
/// Terminals that understand OSC 8 get a hyperlink; others get plain cyan
/// text. Checks stderr, where all status output goes.
pub fn terminal_link(url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stderr) {
        format!("\x1b]8;;{}\x07\x1b[36m{}\x1b[0m\x1b]8;;\x07", url, url)
    } else {
        format!("\x1b[36m{}\x1b[0m", url)
    }
}

/// Wrap text in a dim ANSI style
pub fn dim(text: &str) -> String {
    format!("\x1b[2m{}\x1b[0m", text)
}

/// Wrap text in a yellow ANSI style
pub fn warning(text: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_link_contains_url_and_color() {
        let url = "http://localhost:8080/api/datasets/d1/rows?page=0&size=20";
        let result = terminal_link(url);
        assert!(result.contains(url));
        assert!(result.contains("\x1b[36m"));
        assert!(result.ends_with("\x1b[0m") || result.ends_with("\x1b]8;;\x07"));
    }

    #[test]
    fn test_terminal_link_format() {
        let url = "https://test.com";
        let result = terminal_link(url);
        if result.contains("\x1b]8;;") {
            assert!(result.contains(&format!("\x1b]8;;{}\x07", url)));
        } else {
            assert_eq!(result, format!("\x1b[36m{}\x1b[0m", url));
        }
    }

    #[test]
    fn test_styles_wrap_text() {
        assert_eq!(dim("x"), "\x1b[2mx\x1b[0m");
        assert_eq!(warning("careful"), "\x1b[33mcareful\x1b[0m");
    }
}
