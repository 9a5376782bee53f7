use super::{CompareOp, ConditionError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Str(String),
    Num(f64),
    Ident(String),
    LParen,
    RParen,
    Compare(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '[' | ']' | '$')
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (kind, width) = match (c, next) {
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('=', Some('=')) => (TokenKind::Compare(CompareOp::Eq), 2),
            ('!', Some('=')) => (TokenKind::Compare(CompareOp::Ne), 2),
            ('>', Some('=')) => (TokenKind::Compare(CompareOp::Ge), 2),
            ('<', Some('=')) => (TokenKind::Compare(CompareOp::Le), 2),
            ('>', _) => (TokenKind::Compare(CompareOp::Gt), 1),
            ('<', _) => (TokenKind::Compare(CompareOp::Lt), 1),
            ('!', _) => (TokenKind::Not, 1),
            ('"' | '\'', _) => {
                let (text, consumed) = read_string(&chars[i..], pos)?;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    pos,
                });
                i += consumed;
                continue;
            }
            (c, n) if c.is_ascii_digit() || (c == '-' && n.is_some_and(|n| n.is_ascii_digit())) => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
                    .map(|p| i + 1 + p)
                    .unwrap_or(chars.len());
                let text: String = chars[i..end].iter().map(|(_, ch)| ch).collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::new(pos, format!("invalid number '{text}'")))?;
                tokens.push(Token {
                    kind: TokenKind::Num(value),
                    pos,
                });
                i = end;
                continue;
            }
            (c, _) if is_ident_start(c) => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, ch)| !is_ident_char(*ch))
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                let word: String = chars[i..end].iter().map(|(_, ch)| ch).collect();
                tokens.push(Token {
                    kind: keyword(&word).unwrap_or(TokenKind::Ident(word)),
                    pos,
                });
                i = end;
                continue;
            }
            (c, _) => {
                return Err(ConditionError::new(
                    pos,
                    format!("unexpected character '{c}'"),
                ))
            }
        };

        tokens.push(Token { kind, pos });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: src.len(),
    });
    Ok(tokens)
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "contains" => TokenKind::Compare(CompareOp::Contains),
        "startswith" => TokenKind::Compare(CompareOp::StartsWith),
        "endswith" => TokenKind::Compare(CompareOp::EndsWith),
        "matches" => TokenKind::Compare(CompareOp::Matches),
        _ => return None,
    };
    Some(kind)
}

/// Read a quoted string starting at `chars[0]`; returns the text and chars consumed.
fn read_string(chars: &[(usize, char)], pos: usize) -> Result<(String, usize), ConditionError> {
    let quote = chars[0].1;
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| ConditionError::new(pos, "unterminated string"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ConditionError::new(pos, "unterminated string"))
}
