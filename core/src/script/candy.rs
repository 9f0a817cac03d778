//! Line-based sugar pass applied to every script before compilation.
//!
//! Rewrites, in order: `!=` to `~=`, postfix `x++`/`x--` to plain
//! assignments, and compound assignment `x OP= expr` to `x = x OP (expr)`.
//! Content after a line comment is never rewritten; the alternate comment
//! marker `//` is normalized to `--`. The pass is the identity on text that
//! uses none of the sugar, so running it twice changes nothing.
//!
//! Known fragility: the pass has no idea about multi-line string literals, so
//! sugar-looking text inside one will be rewritten. Scripts that need such
//! strings should build them with concatenation.

/// Keywords that terminate the right-hand side of a compound assignment.
const TERMINATORS: [&str; 6] = ["then", "do", "end", "else", "elseif", "until"];

pub fn process(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n");
    let lines: Vec<String> = normalized.split('\n').map(process_line).collect();
    lines.join("\n")
}

fn process_line(line: &str) -> String {
    let (code, comment) = split_comment(line);
    let mut code = code.replace("!=", "~=");
    code = rewrite_incdec(&code, "++", '+');
    code = rewrite_incdec(&code, "--", '-');
    code = rewrite_compound(&code);
    match comment {
        Some(rest) => format!("{}--{}", code, rest),
        None => code,
    }
}

/// Split a line at its comment marker. Returns the code part and the comment
/// body (marker stripped). A `--` directly after an identifier character is a
/// postfix decrement, not a comment.
fn split_comment(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let pair = &bytes[i..i + 2];
        if pair == b"//" {
            return (&line[..i], Some(&line[i + 2..]));
        }
        if pair == b"--" {
            let decrement = i > 0 && is_ident_byte(bytes[i - 1]);
            if !decrement {
                return (&line[..i], Some(&line[i + 2..]));
            }
        }
        i += 1;
    }
    (line, None)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// `x++` -> `x = x + 1` (and the `--`/`- 1` twin). All occurrences on the
/// line are rewritten.
fn rewrite_incdec(code: &str, pat: &str, op: char) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(pos) = rest.find(pat) {
        let (before, after) = (&rest[..pos], &rest[pos + pat.len()..]);
        let ident_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii() && is_ident_byte(*c as u8))
            .last()
            .map(|(i, _)| i)
            .unwrap_or(before.len());
        let ident = &before[ident_start..];
        if ident.is_empty() {
            out.push_str(&rest[..pos + pat.len()]);
        } else {
            out.push_str(&before[..ident_start]);
            out.push_str(&format!("{ident} = {ident} {op} 1"));
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// `x OP= expr` -> `x = x OP (expr)`, with `expr` captured greedily up to a
/// statement-terminating keyword or end of line.
fn rewrite_compound(code: &str) -> String {
    let bytes = code.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let op = bytes[i];
        if matches!(op, b'+' | b'-' | b'*' | b'/' | b'%')
            && bytes[i + 1] == b'='
            && bytes.get(i + 2) != Some(&b'=')
        {
            // identifier (with optional whitespace) directly before the op
            let mut id_end = i;
            while id_end > 0 && (bytes[id_end - 1] == b' ' || bytes[id_end - 1] == b'\t') {
                id_end -= 1;
            }
            let mut id_start = id_end;
            while id_start > 0 && is_ident_byte(bytes[id_start - 1]) {
                id_start -= 1;
            }
            if id_start == id_end {
                i += 1;
                continue;
            }
            let ident = &code[id_start..id_end];
            let rhs = &code[i + 2..];
            let (raw_expr, tail) = split_at_terminator(rhs);
            let expr = raw_expr.trim();
            if expr.is_empty() {
                i += 1;
                continue;
            }
            let trailing_ws = &raw_expr[raw_expr.trim_end().len()..];
            return format!(
                "{}{ident} = {ident} {} ({expr}){trailing_ws}{tail}",
                &code[..id_start],
                op as char,
            );
        }
        i += 1;
    }
    code.to_string()
}

/// Cut the rhs before the first whitespace-delimited terminator keyword.
fn split_at_terminator(rhs: &str) -> (&str, &str) {
    let bytes = rhs.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if !b.is_ascii_whitespace() {
            continue;
        }
        let word_start = i + 1;
        let word_end = rhs[word_start..]
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .map(|o| word_start + o)
            .unwrap_or(rhs.len());
        let word = &rhs[word_start..word_end];
        if TERMINATORS.contains(&word) {
            return (&rhs[..i], &rhs[i..]);
        }
    }
    (rhs, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_assignment_keeps_the_comment_untouched() {
        assert_eq!(process("x += 1 -- bump"), "x = x + (1) -- bump");
    }

    #[test]
    fn identity_on_non_sugar_code() {
        for line in ["a ~ b", "x = x + (1)", "print('hi', 1, 2)", "a <= b", "-- note"] {
            assert_eq!(process(line), line, "line {:?}", line);
        }
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let source = "x += 2 -- up\ni++\nhp -= dmg end\nif a != b then c-- end";
        let once = process(source);
        assert_eq!(process(&once), once);
    }

    #[test]
    fn alternate_comment_marker_is_normalized() {
        assert_eq!(process("cls(0) // wipe"), "cls(0) -- wipe");
        assert_eq!(process("// whole line"), "-- whole line");
    }

    #[test]
    fn not_equal_becomes_canonical() {
        assert_eq!(process("if a != b then end"), "if a ~= b then end");
        // but not in a comment
        assert_eq!(process("-- a != b"), "-- a != b");
    }

    #[test]
    fn increment_and_decrement_expand() {
        assert_eq!(process("i++"), "i = i + 1");
        assert_eq!(process("i--"), "i = i - 1");
        assert_eq!(process("p.x++"), "p.x = p.x + 1");
        // a decrement before a real comment
        assert_eq!(process("i-- -- down"), "i = i - 1 -- down");
    }

    #[test]
    fn compound_capture_stops_at_statement_keywords() {
        assert_eq!(
            process("if f then x += y * 2 end"),
            "if f then x = x + (y * 2) end"
        );
        assert_eq!(process("hp -= dmg end"), "hp = hp - (dmg) end");
        assert_eq!(process("s *= 2 until done"), "s = s * (2) until done");
    }

    #[test]
    fn line_structure_is_preserved() {
        let source = "a = 1\nb = 2\n";
        assert_eq!(process(source), source);
        assert_eq!(process("x += 1\ny += 2"), "x = x + (1)\ny = y + (2)");
    }

    #[test]
    fn all_increments_on_a_line_are_rewritten() {
        assert_eq!(process("i++ j++"), "i = i + 1 j = j + 1");
    }
}
