//! Solidity import scanner.
//!
//! Scans Solidity source for import paths without full parsing. Comments are
//! skipped and string literals outside import statements are stepped over, so
//! import-like text inside either never produces a match.

use serde::Serialize;
use std::collections::HashSet;

/// Syntactic form of an import statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// `import "path";` or `import "path" as Name;`
    Plain,
    /// `import * as Name from "path";`
    Namespace,
    /// `import {A, B as C} from "path";`
    Symbols,
    /// `import Name from "path";`
    Default,
}

/// Import path found in source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedImport {
    /// Path exactly as written between the quotes.
    pub raw: String,
    pub kind: ImportKind,
    /// Line of the `import` keyword (1-indexed).
    pub line: u32,
}

/// Scan Solidity source for import paths.
///
/// Returns imports in first-appearance order, deduplicated by `raw`.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<ScannedImport> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut line_num: u32 = 1;
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i] == '\n' {
            line_num += 1;
            i += 1;
            continue;
        }

        if let Some(end) = skip_comment(&chars, i, &mut line_num) {
            i = end;
            continue;
        }

        // String literals outside imports are neutralised.
        if chars[i] == '"' || chars[i] == '\'' {
            let (_, end) = read_string(&chars, i, &mut line_num);
            i = end;
            continue;
        }

        if matches_keyword(&chars, i, "import") {
            let start_line = line_num;
            let mut scan_line = line_num;
            if let Some((raw, kind, end)) = scan_import_statement(&chars, i + 6, &mut scan_line) {
                if !raw.is_empty() && seen.insert(raw.clone()) {
                    results.push(ScannedImport {
                        raw,
                        kind,
                        line: start_line,
                    });
                }
                line_num = scan_line;
                i = end;
                continue;
            }
        }

        i += 1;
    }

    results
}

/// Skip a `//` or `/* */` comment starting at `pos`. Returns the end position.
fn skip_comment(chars: &[char], pos: usize, line_num: &mut u32) -> Option<usize> {
    let len = chars.len();
    if pos + 1 >= len || chars[pos] != '/' {
        return None;
    }

    match chars[pos + 1] {
        '/' => {
            let mut i = pos;
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            Some(i)
        }
        '*' => {
            let mut i = pos + 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    *line_num += 1;
                }
                i += 1;
            }
            Some((i + 2).min(len))
        }
        _ => None,
    }
}

/// Read a quoted string starting at the quote at `pos`.
///
/// Returns the contents and the position after the closing quote. An
/// unterminated string runs to the end of the line.
fn read_string(chars: &[char], pos: usize, line_num: &mut u32) -> (String, usize) {
    let len = chars.len();
    let quote = chars[pos];
    let mut i = pos + 1;
    let mut value = String::new();

    while i < len && chars[i] != quote {
        if chars[i] == '\n' {
            // Solidity strings cannot span lines.
            return (value, i);
        }
        if chars[i] == '\\' && i + 1 < len {
            value.push(chars[i + 1]);
            i += 2;
            continue;
        }
        value.push(chars[i]);
        i += 1;
    }

    (value, (i + 1).min(len))
}

/// Check if chars at position match a keyword (with word boundary).
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    let len = kw.len();

    if pos + len > chars.len() {
        return false;
    }

    if pos > 0 && is_ident_char(chars[pos - 1]) {
        return false;
    }

    if kw.iter().enumerate().any(|(j, &c)| chars[pos + j] != c) {
        return false;
    }

    !(pos + len < chars.len() && is_ident_char(chars[pos + len]))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn skip_trivia(chars: &[char], mut i: usize, line_num: &mut u32) -> usize {
    let len = chars.len();
    while i < len {
        if chars[i].is_whitespace() {
            if chars[i] == '\n' {
                *line_num += 1;
            }
            i += 1;
        } else if let Some(end) = skip_comment(chars, i, line_num) {
            i = end;
        } else {
            break;
        }
    }
    i
}

/// Scan the remainder of an import statement after the `import` keyword.
///
/// Returns (path, kind, end position). Gives up at `;` when no path was found.
fn scan_import_statement(
    chars: &[char],
    start: usize,
    line_num: &mut u32,
) -> Option<(String, ImportKind, usize)> {
    let len = chars.len();
    let mut i = skip_trivia(chars, start, line_num);
    if i >= len {
        return None;
    }

    let kind = match chars[i] {
        '"' | '\'' => {
            let (raw, end) = read_string(chars, i, line_num);
            return Some((raw, ImportKind::Plain, end));
        }
        '*' => ImportKind::Namespace,
        '{' => ImportKind::Symbols,
        c if is_ident_char(c) => ImportKind::Default,
        _ => return None,
    };

    // Walk to `from`, stopping at the end of the statement.
    while i < len {
        i = skip_trivia(chars, i, line_num);
        if i >= len || chars[i] == ';' || chars[i] == '"' || chars[i] == '\'' {
            return None;
        }
        if matches_keyword(chars, i, "from") {
            i = skip_trivia(chars, i + 4, line_num);
            if i < len && (chars[i] == '"' || chars[i] == '\'') {
                let (raw, end) = read_string(chars, i, line_num);
                return Some((raw, kind, end));
            }
            return None;
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(source: &str) -> Vec<String> {
        scan_imports(source).into_iter().map(|i| i.raw).collect()
    }

    #[test]
    fn test_plain_import() {
        let imports = scan_imports(r#"import "./Token.sol";"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "./Token.sol");
        assert_eq!(imports[0].kind, ImportKind::Plain);
    }

    #[test]
    fn test_plain_import_with_alias() {
        let imports = scan_imports(r#"import "@openzeppelin/contracts/utils/Strings.sol" as S;"#);
        assert_eq!(imports[0].raw, "@openzeppelin/contracts/utils/Strings.sol");
        assert_eq!(imports[0].kind, ImportKind::Plain);
    }

    #[test]
    fn test_namespace_import() {
        let imports = scan_imports(r#"import * as Math from "../lib/Math.sol";"#);
        assert_eq!(imports[0].raw, "../lib/Math.sol");
        assert_eq!(imports[0].kind, ImportKind::Namespace);
    }

    #[test]
    fn test_symbol_import() {
        let imports = scan_imports(
            r#"import {ERC20, IERC20 as Token} from "@openzeppelin/contracts/token/ERC20/ERC20.sol";"#,
        );
        assert_eq!(imports[0].raw, "@openzeppelin/contracts/token/ERC20/ERC20.sol");
        assert_eq!(imports[0].kind, ImportKind::Symbols);
    }

    #[test]
    fn test_multiline_symbol_import() {
        let source = "pragma solidity ^0.8.20;\n\nimport {\n    Ownable,\n    Context\n} from 'solady/src/auth/Ownable.sol';\n";
        let imports = scan_imports(source);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "solady/src/auth/Ownable.sol");
        assert_eq!(imports[0].line, 3);
    }

    #[test]
    fn test_default_import() {
        let imports = scan_imports(r#"import Lib from "./Lib.sol";"#);
        assert_eq!(imports[0].kind, ImportKind::Default);
    }

    #[test]
    fn test_ignores_comments() {
        let source = r#"
// import "./commented.sol";
/* import "./block.sol";
   import {A} from "./also.sol"; */
import "./real.sol";
"#;
        assert_eq!(raws(source), vec!["./real.sol"]);
    }

    #[test]
    fn test_ignores_import_text_in_strings() {
        let source = r#"
contract C {
    string constant DOC = "import \"./fake.sol\";";
    string constant OTHER = 'import {X} from "./fake2.sol"';
}
import "./real.sol";
"#;
        assert_eq!(raws(source), vec!["./real.sol"]);
    }

    #[test]
    fn test_identifier_containing_import_is_not_keyword() {
        let source = r#"
uint256 reimport = 1;
function importer() {}
import "./real.sol";
"#;
        assert_eq!(raws(source), vec!["./real.sol"]);
    }

    #[test]
    fn test_dedup_and_order() {
        let source = r#"
import "./B.sol";
import {A} from "./A.sol";
import "./B.sol";
"#;
        assert_eq!(raws(source), vec!["./B.sol", "./A.sol"]);
    }

    #[test]
    fn test_line_numbers() {
        let source = "// header\n/*\n multi\n*/\nimport \"./A.sol\";\n\nimport \"./B.sol\";\n";
        let imports = scan_imports(source);
        assert_eq!(imports[0].line, 5);
        assert_eq!(imports[1].line, 7);
    }

    #[test]
    fn test_incomplete_statement() {
        assert!(scan_imports("import {A} ;").is_empty());
        assert!(scan_imports("import").is_empty());
        assert!(scan_imports("").is_empty());
    }

    #[test]
    fn test_url_imports() {
        let source = r#"
import "https://github.com/OpenZeppelin/openzeppelin-contracts/blob/v5.0.2/contracts/access/Ownable.sol";
import "ipfs://QmHash/Lib.sol";
"#;
        assert_eq!(
            raws(source),
            vec![
                "https://github.com/OpenZeppelin/openzeppelin-contracts/blob/v5.0.2/contracts/access/Ownable.sol",
                "ipfs://QmHash/Lib.sol",
            ]
        );
    }
}
