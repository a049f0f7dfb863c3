use regex::Regex;

use crate::parser::traits::{LogFields, LogParser, ParseError};

/// Parser for nginx `log_format`-style lines.
///
/// Every `$name` placeholder in the format becomes a named capture that
/// consumes input up to the first character of the literal text that
/// follows it. A trailing placeholder consumes the rest of the line.
///
/// ```text
/// $remote_addr - $remote_user [$time_local] "$request" $status
/// ```
pub struct TextParser {
    regex: Regex,
    names: Vec<String>,
}

impl TextParser {
    pub fn new(format: &str) -> Result<Self, ParseError> {
        let (pattern, names) = compile_format(format)?;
        let regex = Regex::new(&pattern).map_err(|e| ParseError::InvalidFormat(e.to_string()))?;
        Ok(Self { regex, names })
    }

    /// Placeholder names in the order they appear, duplicates removed.
    pub fn field_names(&self) -> &[String] {
        &self.names
    }
}

impl LogParser for TextParser {
    fn parse(&self, line: &str) -> Result<LogFields, ParseError> {
        let caps = self.regex.captures(line).ok_or(ParseError::NoMatch)?;

        let mut fields = LogFields::new();
        for name in &self.names {
            if let Some(m) = caps.name(name) {
                fields.insert(name, m.as_str());
            }
        }
        Ok(fields)
    }
}

enum Token {
    Literal(String),
    Placeholder(String),
}

fn tokenize(format: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            // a lone '$' is literal text
            literal.push('$');
            continue;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        tokens.push(Token::Placeholder(name));
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

fn compile_format(format: &str) -> Result<(String, Vec<String>), ParseError> {
    let tokens = tokenize(format);
    if !tokens.iter().any(|t| matches!(t, Token::Placeholder(_))) {
        return Err(ParseError::InvalidFormat(format!(
            "format '{}' contains no $placeholders",
            format
        )));
    }

    let mut pattern = String::from("^");
    let mut names: Vec<String> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(text) => pattern.push_str(&regex::escape(text)),
            Token::Placeholder(name) => {
                let stop = match tokens.get(i + 1) {
                    Some(Token::Literal(next)) => next.chars().next(),
                    _ => None,
                };
                let body = match stop {
                    Some(c) => format!("[^{}]*", regex::escape(&c.to_string())),
                    None => ".*".to_string(),
                };

                // regex rejects duplicate group names; later repeats are matched but not captured
                if names.iter().any(|n| n == name) {
                    pattern.push_str(&format!("(?:{})", body));
                } else {
                    pattern.push_str(&format!("(?P<{}>{})", name, body));
                    names.push(name.clone());
                }
            }
        }
    }
    pattern.push('$');

    Ok((pattern, names))
}
