/// Shell-style glob match over element instance names.
///
/// `*` matches any run of characters, `?` any single character, and
/// `[abc]` / `[a-z]` / `[^abc]` character sets. An unterminated set matches
/// nothing.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    match_bytes(pattern.as_bytes(), name.as_bytes())
}

fn match_bytes(pat: &[u8], name: &[u8]) -> bool {
    match pat.split_first() {
        None => name.is_empty(),
        Some((b'*', rest)) => {
            // Try every split point, shortest first.
            (0..=name.len()).any(|i| match_bytes(rest, &name[i..]))
        }
        Some((b'?', rest)) => match name.split_first() {
            Some((_, name_rest)) => match_bytes(rest, name_rest),
            None => false,
        },
        Some((b'[', rest)) => {
            let Some((set, after)) = split_set(rest) else {
                return false;
            };
            match name.split_first() {
                Some((&c, name_rest)) => set_contains(set, c) && match_bytes(after, name_rest),
                None => false,
            }
        }
        Some((&p, rest)) => match name.split_first() {
            Some((&c, name_rest)) => p == c && match_bytes(rest, name_rest),
            None => false,
        },
    }
}

// Split `abc]rest` into (`abc`, `rest`). A `]` in first position is literal.
fn split_set(pat: &[u8]) -> Option<(&[u8], &[u8])> {
    let start = usize::from(pat.first() == Some(&b']') || pat.first() == Some(&b'^'));
    let close = pat.iter().skip(start + 1).position(|&b| b == b']')? + start + 1;
    Some((&pat[..close], &pat[close + 1..]))
}

fn set_contains(set: &[u8], c: u8) -> bool {
    let (negated, set) = match set.split_first() {
        Some((b'^', rest)) => (true, rest),
        _ => (false, set),
    };
    let mut found = false;
    let mut i = 0;
    while i < set.len() {
        if i + 2 < set.len() && set[i + 1] == b'-' {
            if set[i] <= c && c <= set[i + 2] {
                found = true;
            }
            i += 3;
        } else {
            if set[i] == c {
                found = true;
            }
            i += 1;
        }
    }
    found != negated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_wildcards() {
        assert!(glob_match("queue", "queue"));
        assert!(!glob_match("queue", "queue2"));
        assert!(glob_match("q*", "queue"));
        assert!(glob_match("*ue", "queue"));
        assert!(glob_match("q?eue", "queue"));
        assert!(!glob_match("q?", "queue"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn character_sets() {
        assert!(glob_match("c[12]", "c1"));
        assert!(glob_match("c[0-9]", "c7"));
        assert!(!glob_match("c[0-9]", "cx"));
        assert!(glob_match("c[^0-9]", "cx"));
        assert!(!glob_match("c[12", "c1")); // unterminated set
    }
}
