//! URL replacement that understands PHP-serialized values.
//!
//! WordPress stores arrays and objects in option and meta rows with PHP's `serialize()`,
//! where every string carries its byte length (`s:19:"http://blog.test/a";`). A naive
//! text replace changes the payload without fixing the length and corrupts the row.
//! Here serialized values are walked structurally and every string length is recomputed.
//! Values that look serialized but do not parse, or nest deeper than
//! `MAX_SERIALIZED_DEPTH`, are left untouched.
use crate::constants::MAX_SERIALIZED_DEPTH;

/// Replace every occurrence of `old` with `new` in `value`.
///
/// A match only counts when the host ends there: `http://blog.test` rewrites
/// `http://blog.test/about` but not `http://blog.testing.example`.
#[must_use]
pub fn replace_url(value: &str, old: &str, new: &str) -> String {
    rewrite(value, old, new, 0).unwrap_or_else(|| value.to_string())
}

/// `None` when nesting exceeds the depth bound anywhere inside `value`.
fn rewrite(value: &str, old: &str, new: &str, depth: usize) -> Option<String> {
    if old.is_empty() || !value.contains(old) && !value.contains(&escape_slashes(old)) {
        return Some(value.to_string());
    }
    if looks_serialized(value) {
        let mut out = String::with_capacity(value.len());
        let mut p = Parser {
            src: value,
            pos: 0,
            depth,
            too_deep: false,
            old,
            new,
            out: &mut out,
        };
        let parsed = p.value().is_some() && p.pos == value.len();
        if p.too_deep {
            return None;
        }
        return Some(if parsed { out } else { value.to_string() });
    }
    Some(replace_plain(value, old, new))
}

fn escape_slashes(s: &str) -> String {
    s.replace('/', "\\/")
}

fn replace_plain(value: &str, old: &str, new: &str) -> String {
    let replaced = replace_bounded(value, old, new);
    let esc_old = escape_slashes(old);
    if replaced.contains(&esc_old) {
        replace_bounded(&replaced, &esc_old, &escape_slashes(new))
    } else {
        replaced
    }
}

fn is_host_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// `true` when `after` continues the host name the match ended in.
fn continues_host(after: &str) -> bool {
    match after.as_bytes() {
        [b, ..] if is_host_byte(*b) => true,
        [b'.', b, ..] => is_host_byte(*b),
        _ => false,
    }
}

fn replace_bounded(haystack: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(i) = rest.find(needle) {
        let after = &rest[i + needle.len()..];
        out.push_str(&rest[..i]);
        out.push_str(if continues_host(after) { needle } else { replacement });
        rest = after;
    }
    out.push_str(rest);
    out
}

/// `true` when `value` starts like a PHP-serialized scalar, array or object.
#[must_use]
pub fn looks_serialized(value: &str) -> bool {
    let v = value.trim_end();
    if v == "N;" || v == "b:0;" || v == "b:1;" {
        return true;
    }
    let b = v.as_bytes();
    b.len() >= 4
        && matches!(b[0], b's' | b'a' | b'O' | b'i' | b'd')
        && b[1] == b':'
        && matches!(b[b.len() - 1], b';' | b'}')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
    too_deep: bool,
    old: &'a str,
    new: &'a str,
    out: &'a mut String,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Option<()> {
        (self.peek()? == c).then(|| self.pos += 1)
    }

    /// Read up to (not including) `end`, advancing past it.
    fn until(&mut self, end: u8) -> Option<&'a str> {
        let rest = self.src.as_bytes().get(self.pos..)?;
        let idx = rest.iter().position(|&b| b == end)?;
        let s = self.src.get(self.pos..self.pos + idx)?;
        self.pos += idx + 1;
        Some(s)
    }

    fn count(&mut self, end: u8) -> Option<usize> {
        self.until(end)?.parse().ok()
    }

    /// Skip a `len`-byte run; `None` if it overflows or leaves the input.
    fn take(&mut self, len: usize) -> Option<&'a str> {
        let end = self.pos.checked_add(len)?;
        let s = self.src.get(self.pos..end)?;
        self.pos = end;
        Some(s)
    }

    fn copy_from(&mut self, start: usize) {
        self.out.push_str(&self.src[start..self.pos]);
    }

    fn enter(&mut self) -> Option<()> {
        if self.depth >= MAX_SERIALIZED_DEPTH {
            self.too_deep = true;
            return None;
        }
        self.depth += 1;
        Some(())
    }

    fn members(&mut self, n: usize) -> Option<()> {
        self.enter()?;
        for _ in 0..n.checked_mul(2)? {
            self.value()?;
        }
        self.depth -= 1;
        self.expect(b'}')?;
        self.out.push('}');
        Some(())
    }

    fn value(&mut self) -> Option<()> {
        let start = self.pos;
        match self.peek()? {
            b'N' => {
                self.pos += 1;
                self.expect(b';')?;
                self.copy_from(start);
            }
            b'i' | b'd' | b'b' => {
                self.pos += 1;
                self.expect(b':')?;
                self.until(b';')?;
                self.copy_from(start);
            }
            b's' => {
                self.pos += 1;
                self.expect(b':')?;
                let len = self.count(b':')?;
                self.expect(b'"')?;
                let body = self.take(len)?;
                self.expect(b'"')?;
                self.expect(b';')?;
                // Strings may hold serialized data of their own.
                let Some(replaced) = rewrite(body, self.old, self.new, self.depth + 1) else {
                    self.too_deep = true;
                    return None;
                };
                self.out.push_str(&format!("s:{}:\"{replaced}\";", replaced.len()));
            }
            b'a' => {
                self.pos += 1;
                self.expect(b':')?;
                let n = self.count(b':')?;
                self.expect(b'{')?;
                self.copy_from(start);
                self.members(n)?;
            }
            b'O' => {
                self.pos += 1;
                self.expect(b':')?;
                let len = self.count(b':')?;
                self.expect(b'"')?;
                self.take(len)?;
                self.expect(b'"')?;
                self.expect(b':')?;
                let n = self.count(b':')?;
                self.expect(b'{')?;
                self.copy_from(start);
                self.members(n)?;
            }
            _ => return None,
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_SERIALIZED_DEPTH;

    const OLD: &str = "http://blog.test";
    const NEW: &str = "https://blog.local";

    #[test]
    fn plain_text_and_escaped_json_are_replaced() {
        assert_eq!(
            replace_url("<a href=\"http://blog.test/x\">", OLD, NEW),
            "<a href=\"https://blog.local/x\">"
        );
        assert_eq!(
            replace_url("{\"u\":\"http:\\/\\/blog.test\\/y\"}", OLD, NEW),
            "{\"u\":\"https:\\/\\/blog.local\\/y\"}"
        );
        assert_eq!(replace_url("nothing here", OLD, NEW), "nothing here");
    }

    #[test]
    fn serialized_lengths_are_recomputed() {
        let v = "a:2:{s:4:\"home\";s:19:\"http://blog.test/a/\";i:0;b:1;}";
        assert_eq!(
            replace_url(v, OLD, NEW),
            "a:2:{s:4:\"home\";s:21:\"https://blog.local/a/\";i:0;b:1;}"
        );
    }

    #[test]
    fn nested_objects_and_serialized_strings_inside_strings() {
        let inner = "s:16:\"http://blog.test\";";
        let v = format!(
            "O:8:\"stdClass\":1:{{s:3:\"raw\";s:{}:\"{inner}\";}}",
            inner.len()
        );
        let out = replace_url(&v, OLD, NEW);
        let new_inner = "s:18:\"https://blog.local\";";
        assert_eq!(
            out,
            format!(
                "O:8:\"stdClass\":1:{{s:3:\"raw\";s:{}:\"{new_inner}\";}}",
                new_inner.len()
            )
        );
    }

    #[test]
    fn multibyte_lengths_are_bytes() {
        let v = "s:22:\"http://blog.test/caf\u{e9}\";";
        assert_eq!(
            replace_url(v, OLD, NEW),
            "s:24:\"https://blog.local/caf\u{e9}\";"
        );
    }

    #[test]
    fn overflowing_lengths_are_treated_as_malformed() {
        let v = "s:18446744073709551615:\"http://blog.test\";";
        assert_eq!(replace_url(v, OLD, NEW), v);
        let o = "O:18446744073709551615:\"X\":1:{s:1:\"u\";s:16:\"http://blog.test\";}";
        assert_eq!(replace_url(o, OLD, NEW), o);
    }

    #[test]
    fn nesting_past_the_depth_bound_is_left_untouched() {
        let depth = MAX_SERIALIZED_DEPTH + 1;
        let deep = format!(
            "{}s:16:\"http://blog.test\";{}",
            "a:1:{i:0;".repeat(depth),
            "}".repeat(depth)
        );
        assert_eq!(replace_url(&deep, OLD, NEW), deep);

        let shallow = format!(
            "{}s:16:\"http://blog.test\";{}",
            "a:1:{i:0;".repeat(3),
            "}".repeat(3)
        );
        assert!(replace_url(&shallow, OLD, NEW).contains("s:18:\"https://blog.local\";"));
    }

    #[test]
    fn match_must_end_the_host() {
        assert_eq!(
            replace_url("http://blog.testing.example/ and http://blog.test.example", OLD, NEW),
            "http://blog.testing.example/ and http://blog.test.example"
        );
        assert_eq!(
            replace_url("see http://blog.test. or http://blog.test:8080/x or http://blog.test", OLD, NEW),
            "see https://blog.local. or https://blog.local:8080/x or https://blog.local"
        );
        assert_eq!(
            replace_url("{\"a\":\"http:\\/\\/blog.tester\"}", OLD, NEW),
            "{\"a\":\"http:\\/\\/blog.tester\"}"
        );
    }

    #[test]
    fn malformed_serialized_is_left_untouched() {
        let v = "a:1:{s:99:\"http://blog.test\";}";
        assert_eq!(replace_url(v, OLD, NEW), v);
    }
}
