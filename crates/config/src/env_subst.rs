/// Replace `${ENV_VAR}` placeholders in the raw config text.
///
/// Unresolvable or malformed placeholders are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Replace `${ENV_VAR}` placeholders using a custom lookup function.
///
/// The separate signature keeps the substitution testable without mutating
/// the process environment.
fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        // Leave unresolved placeholder intact.
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // No closing brace or empty name — emit literally.
                out.push_str("${");
                rest = after;
            },
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SANDPIT_TEST_VAR" => Some("hello".to_string()),
            "SANDPIT_TEST_PORT" => Some("4000".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        let out = substitute_with("value = \"${SANDPIT_TEST_VAR}\"", lookup);
        assert_eq!(out, "value = \"hello\"");
    }

    #[test]
    fn leaves_unknown_var_intact() {
        let out = substitute_with("value = \"${NOPE}\"", lookup);
        assert_eq!(out, "value = \"${NOPE}\"");
    }

    #[test]
    fn substitutes_multiple_occurrences() {
        let out = substitute_with("${SANDPIT_TEST_VAR}:${SANDPIT_TEST_PORT}", lookup);
        assert_eq!(out, "hello:4000");
    }

    #[test]
    fn malformed_placeholder_is_literal() {
        assert_eq!(substitute_with("a ${unclosed", lookup), "a ${unclosed");
        assert_eq!(substitute_with("a ${} b", lookup), "a ${} b");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(substitute_with("no placeholders here", lookup), "no placeholders here");
    }
}
