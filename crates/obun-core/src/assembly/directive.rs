use std::path::Path;

use crate::config::settings::DIRECTIVE_MARKER;
use crate::error::CoreError;

/// A `#:` line, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Section(&'a str),
    If(&'a str),
    Else,
    Endif,
}

/// Classify one line (without its terminator). `Ok(None)` is a content line.
///
/// Only the four keywords make a line a directive; any other `#:` line
/// (e.g. a `#: doc` attribute comment) is content. A directive owns its
/// whole line: leading indentation is allowed, trailing content after
/// `#:else` / `#:endif` or a second word after `#:if <flag>` is rejected
/// rather than silently dropped.
pub fn parse_line<'a>(
    path: &Path,
    line_no: usize,
    line: &'a str,
) -> Result<Option<Directive<'a>>, CoreError> {
    let Some(rest) = line.trim_start().strip_prefix(DIRECTIVE_MARKER) else {
        return Ok(None);
    };
    let rest = rest.trim_end();
    let (keyword, arg) = match rest.split_once(char::is_whitespace) {
        Some((k, a)) => (k, a.trim()),
        None => (rest, ""),
    };

    let malformed = |reason: &str| CoreError::MalformedDirective {
        path: path.to_path_buf(),
        line: line_no,
        reason: reason.to_string(),
    };

    let directive = match keyword {
        "section" => {
            if arg.is_empty() {
                return Err(malformed("`#:section` needs a path"));
            }
            Directive::Section(arg)
        }
        "if" => {
            if arg.is_empty() {
                return Err(malformed("`#:if` needs a flag name"));
            }
            if arg.contains(char::is_whitespace) {
                return Err(malformed("`#:if` takes exactly one flag name"));
            }
            Directive::If(arg)
        }
        "else" | "endif" if !arg.is_empty() => {
            return Err(malformed(&format!(
                "`#:{keyword}` must be alone on its line"
            )));
        }
        "else" => Directive::Else,
        "endif" => Directive::Endif,
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Directive<'_>>, CoreError> {
        parse_line(Path::new("/p/a.obun"), 3, line)
    }

    #[test]
    fn test_content_lines() {
        assert_eq!(parse("print('#:if X')").unwrap(), None);
        assert_eq!(parse("# : not a directive").unwrap(), None);
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("    #: the default port").unwrap(), None);
        assert_eq!(parse("#:").unwrap(), None);
        assert_eq!(parse("#:ifdef X").unwrap(), None);
        assert_eq!(parse("#:sections a.obun").unwrap(), None);
    }

    #[test]
    fn test_directives_with_indentation() {
        assert_eq!(
            parse("    #:section lib/util.obun").unwrap(),
            Some(Directive::Section("lib/util.obun"))
        );
        assert_eq!(parse("\t#:if DEBUG  ").unwrap(), Some(Directive::If("DEBUG")));
        assert_eq!(parse("#:else").unwrap(), Some(Directive::Else));
        assert_eq!(parse("  #:endif\r").unwrap(), Some(Directive::Endif));
    }

    #[test]
    fn test_section_path_keeps_inner_spaces() {
        assert_eq!(
            parse("#:section my parts/a.obun").unwrap(),
            Some(Directive::Section("my parts/a.obun"))
        );
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            parse("#:section"),
            Err(CoreError::MalformedDirective { line: 3, .. })
        ));
        assert!(matches!(
            parse("#:if A B"),
            Err(CoreError::MalformedDirective { .. })
        ));
        assert!(matches!(
            parse("#:endif DEBUG"),
            Err(CoreError::MalformedDirective { .. })
        ));
    }
}
