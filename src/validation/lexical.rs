//! Token-level statement classification
//!
//! Used when the dialect parser fails on syntax it does not model. The query is
//! tokenized, split into statements on `;`, and the leading keyword of the only
//! statement decides whether it reads. A `WITH` prefix is skipped to find the
//! statement verb, the way a CTE is resolved by the full parser.

use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

/// What a query looks like at the token level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Shape {
    /// One statement that only reads
    Select,
    /// One statement that is not a plain read
    Other,
    /// Zero or several statements
    Statements(usize),
}

/// Classify `sql` from its tokens
///
/// With `oracle_quoting`, `q'<d>...<d>'` literals are masked before tokenizing
/// when the plain tokenizer fails on them.
pub(super) fn classify(dialect: &dyn Dialect, sql: &str, oracle_quoting: bool) -> Result<Shape, String> {
    let tokens = match Tokenizer::new(dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) if oracle_quoting => {
            let masked = mask_quote_literals(sql).ok_or_else(|| e.to_string())?;
            Tokenizer::new(dialect, &masked).tokenize().map_err(|e| e.to_string())?
        }
        Err(e) => return Err(e.to_string()),
    };

    let mut statements: Vec<Vec<Token>> = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        match token {
            Token::SemiColon => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            Token::Whitespace(_) | Token::EOF => {}
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }

    Ok(match statements.as_slice() {
        [statement] if reads_only(statement) => Shape::Select,
        [_] => Shape::Other,
        _ => Shape::Statements(statements.len()),
    })
}

fn reads_only(tokens: &[Token]) -> bool {
    let base = tokens.iter().take_while(|t| matches!(t, Token::LParen)).count();
    match tokens.get(base) {
        Some(Token::Word(word)) if matches!(word.keyword, Keyword::SELECT | Keyword::WITH) => {}
        _ => return false,
    }

    let mut depth = 0usize;
    let mut verb = None;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(word) if depth == base && word.quote_style.is_none() => match word.keyword {
                // SELECT ... INTO writes a table or a file
                Keyword::INTO => return false,
                Keyword::SELECT
                | Keyword::INSERT
                | Keyword::UPDATE
                | Keyword::DELETE
                | Keyword::MERGE
                | Keyword::REPLACE
                    if verb.is_none() =>
                {
                    verb = Some(word.keyword);
                }
                _ => {}
            },
            _ => {}
        }
    }
    verb == Some(Keyword::SELECT)
}

/// Replace Oracle alternative-quoted literals (`q'[...]'`, `Q'{...}'`, `q'!...!'`)
/// with an empty string literal
///
/// Ordinary string literals, quoted identifiers and comments are copied as they
/// are. Returns `None` when a `q'` literal is not terminated.
fn mask_quote_literals(sql: &str) -> Option<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    let copy_until = |out: &mut String, from: usize, end: &[char]| -> usize {
        let mut j = from;
        while j < chars.len() {
            if chars[j..].starts_with(end) {
                out.extend(&chars[from..j + end.len()]);
                return j + end.len();
            }
            j += 1;
        }
        out.extend(&chars[from..]);
        chars.len()
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\'' => {
                // '' inside a literal is an escaped quote, which the scan handles as
                // the end of one literal followed by the start of the next
                out.push(c);
                i = copy_until(&mut out, i + 1, &['\'']);
            }
            '"' => {
                out.push(c);
                i = copy_until(&mut out, i + 1, &['"']);
            }
            '-' if next == Some('-') => i = copy_until(&mut out, i, &['\n']),
            '/' if next == Some('*') => {
                out.push_str("/*");
                i = copy_until(&mut out, i + 2, &['*', '/']);
            }
            'q' | 'Q' if next == Some('\'') && !i.checked_sub(1).is_some_and(|p| is_identifier_char(chars[p])) => {
                let open = *chars.get(i + 2)?;
                let close = match open {
                    '[' => ']',
                    '(' => ')',
                    '{' => '}',
                    '<' => '>',
                    other => other,
                };
                let end = (i + 3..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == close && chars[j + 1] == '\'')?;
                out.push_str("''");
                i = end + 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}
