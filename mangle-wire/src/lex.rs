/// Splits a control line into whitespace separated tokens.
///
/// A double quoted section keeps its whitespace within the current token. The quotes are kept
/// so that literals can still tell quoted text apart.
pub(crate) fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quoted {
        return Err("unterminated quote".to_string());
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Returns `true` for lines that carry no command.
pub(crate) fn is_blank(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("  field add\tmac offt=0 ").unwrap(), vec!["field", "add", "mac", "offt=0"]);
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn quotes_keep_whitespace() {
        assert_eq!(
            tokenize(r#"rule add r match tag:"a b"=tag"#).unwrap(),
            vec!["rule", "add", "r", "match", r#"tag:"a b"=tag"#]
        );
        assert!(tokenize(r#"rule add "open"#).is_err());
    }

    #[test]
    fn comments_and_blanks() {
        assert!(is_blank("   "));
        assert!(is_blank("  # field add x offt=0 len=1"));
        assert!(!is_blank("iface add eth0"));
    }
}
