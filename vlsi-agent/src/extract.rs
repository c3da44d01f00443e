use regex::Regex;

/// Opening fence must be exactly `python` followed by whitespace, so
/// `python3` or `pythonic` fences never match.
const PYTHON_FENCE: &str = r"(?s)```python\s(.*?)```";

/// Returns the trimmed body of the first python fence in `message`.
///
/// `None` means no such fence; an empty fence yields `Some("")`.
pub fn extract_python_code(message: &str) -> Option<String> {
    let re = Regex::new(PYTHON_FENCE).ok()?;
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_python_block() {
        let msg = "Here you go:\n```python\nimport openroad\nprint('a')\n```\nand\n```python\nprint('b')\n```";
        assert_eq!(
            extract_python_code(msg).as_deref(),
            Some("import openroad\nprint('a')")
        );
    }

    #[test]
    fn test_absent_when_only_other_languages() {
        let msg = "```tcl\nread_lef x.lef\n```\n```bash\nopenroad -exit\n```";
        assert_eq!(extract_python_code(msg), None);
        assert_eq!(extract_python_code("no code at all"), None);
    }

    #[test]
    fn test_tag_must_match_exactly() {
        assert_eq!(extract_python_code("```python3\nprint(1)\n```"), None);
        assert_eq!(extract_python_code("```pythonic\nprint(1)\n```"), None);
    }

    #[test]
    fn test_skips_other_fences_before_python() {
        let msg = "```tcl\nputs hi\n```\ntext\n```python\n  x = 1  \n```";
        assert_eq!(extract_python_code(msg).as_deref(), Some("x = 1"));
    }

    #[test]
    fn test_empty_block_is_not_absent() {
        assert_eq!(extract_python_code("```python\n```").as_deref(), Some(""));
    }

    #[test]
    fn test_unterminated_fence_is_absent() {
        assert_eq!(extract_python_code("```python\nprint(1)\n"), None);
    }
}
