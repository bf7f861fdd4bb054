/// One source line split into instruction tokens plus a trailing comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TokenizedLine {
    pub tokens: Vec<String>,
    pub comment: Option<String>,
}

/// Whitespace-separated tokenization with three carve-outs:
///
/// * a double-quoted token is taken verbatim, quotes and inner whitespace
///   included;
/// * an opening parenthesis absorbs everything up to its balancing close
///   (or end of line) into the current token, keeping expression shape;
/// * `//` starts a comment running to end of line.
///
/// Tabs count as spaces.
pub(crate) fn tokenize_line(line: &str) -> TokenizedLine {
    let mut out = TokenizedLine::default();
    let mut current = String::new();
    let mut in_quote = false;
    let mut paren_depth = 0usize;

    let mut chars = line.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        if in_quote {
            current.push(c);
            if c == '"' {
                in_quote = false;
            }
            continue;
        }
        if paren_depth > 0 {
            current.push(c);
            match c {
                '(' => paren_depth += 1,
                ')' => paren_depth -= 1,
                _ => {}
            }
            continue;
        }
        match c {
            '/' if chars.peek().is_some_and(|(_, next)| *next == '/') => {
                out.comment = Some(line[at + 2..].trim().to_string());
                break;
            }
            '"' => {
                in_quote = true;
                current.push('"');
            }
            '(' => {
                paren_depth = 1;
                current.push('(');
            }
            ' ' | '\t' => {
                if !current.is_empty() {
                    out.tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.tokens.push(current);
    }
    out
}
