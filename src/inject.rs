//! Module injection
//!
//! Extension modules register themselves from `init()`, so wiring one into
//! the host only takes a blank import in the host's entry file. The file is
//! parsed with tree-sitter, the import is spliced in at syntax-node offsets
//! and the result is parsed again before anything touches the disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Injection failures. None of them modify the entry file.
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Cannot add import of {module} to {path}: {reason}")]
    Serialize {
        path: PathBuf,
        module: String,
        reason: String,
    },

    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What [`inject`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Inserted,
    AlreadyPresent,
}

/// Make sure `entry` imports `module`, adding a blank import if it does not.
///
/// Applying this more than once is harmless.
pub fn inject(entry: &Path, module: &str) -> Result<InjectOutcome, InjectError> {
    let io_err = |source| InjectError::Io {
        path: entry.to_path_buf(),
        source,
    };
    let serialize_err = |reason: String| InjectError::Serialize {
        path: entry.to_path_buf(),
        module: module.to_string(),
        reason,
    };

    if module.is_empty() || module.contains(['"', '\\', '`', '\n']) {
        return Err(serialize_err("not a valid import path".to_string()));
    }

    let source = fs::read(entry).map_err(io_err)?;
    let tree = parse(&source).map_err(|reason| InjectError::Parse {
        path: entry.to_path_buf(),
        reason,
    })?;
    let root = tree.root_node();

    if import_paths(root, &source).iter().any(|p| p == module) {
        return Ok(InjectOutcome::AlreadyPresent);
    }

    let (at, text) = insertion(root, &source, module).ok_or_else(|| InjectError::Parse {
        path: entry.to_path_buf(),
        reason: "no package clause".to_string(),
    })?;
    let mut rewritten = Vec::with_capacity(source.len() + text.len());
    rewritten.extend_from_slice(&source[..at]);
    rewritten.extend_from_slice(text.as_bytes());
    rewritten.extend_from_slice(&source[at..]);

    let check = parse(&rewritten).map_err(serialize_err)?;
    let imported = import_paths(check.root_node(), &rewritten);
    if imported.iter().filter(|p| *p == module).count() != 1 {
        return Err(serialize_err("import not found after rewrite".to_string()));
    }

    write_replacing(entry, &rewritten).map_err(io_err)?;
    Ok(InjectOutcome::Inserted)
}

fn parse(source: &[u8]) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| e.to_string())?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "parser returned no tree".to_string())?;
    if let Some(bad) = first_error(tree.root_node()) {
        return Err(format!(
            "syntax error at line {}, column {}",
            bad.start_position().row + 1,
            bad.start_position().column + 1
        ));
    }
    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find_map(first_error);
    found.or(Some(node))
}

fn import_specs<'t>(root: Node<'t>) -> Vec<Node<'t>> {
    let mut specs = Vec::new();
    let mut cursor = root.walk();
    for decl in root.children(&mut cursor) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        let mut inner = decl.walk();
        for child in decl.named_children(&mut inner) {
            match child.kind() {
                "import_spec" => specs.push(child),
                "import_spec_list" => {
                    let mut list = child.walk();
                    specs.extend(
                        child
                            .named_children(&mut list)
                            .filter(|n| n.kind() == "import_spec"),
                    );
                }
                _ => {}
            }
        }
    }
    specs
}

/// Import paths in declaration order, unquoted
fn import_paths(root: Node<'_>, source: &[u8]) -> Vec<String> {
    import_specs(root)
        .into_iter()
        .filter_map(|spec| spec.child_by_field_name("path"))
        .filter_map(|path| path.utf8_text(source).ok())
        .map(|text| text.trim_matches(|c| c == '"' || c == '`').to_string())
        .collect()
}

/// Byte offset and text of the new import.
///
/// Prefers the last parenthesized import group, then a new declaration after
/// the last single import, then a new declaration after the package clause.
fn insertion(root: Node<'_>, source: &[u8], module: &str) -> Option<(usize, String)> {
    let mut cursor = root.walk();
    let top: Vec<Node<'_>> = root.children(&mut cursor).collect();

    let last_import = top.iter().rev().find(|n| n.kind() == "import_declaration");
    if let Some(decl) = last_import {
        let mut inner = decl.walk();
        let group = decl
            .named_children(&mut inner)
            .find(|n| n.kind() == "import_spec_list");
        if let Some(group) = group {
            let mut list = group.walk();
            let close = group.children(&mut list).filter(|n| n.kind() == ")").last()?;
            let at = close.start_byte();
            let newline = if at > 0 && source[at - 1] != b'\n' { "\n" } else { "" };
            return Some((at, format!("{newline}\t_ \"{module}\"\n")));
        }
        return Some((decl.end_byte(), format!("\nimport _ \"{module}\"")));
    }

    let package = top.iter().find(|n| n.kind() == "package_clause")?;
    Some((package.end_byte(), format!("\n\nimport _ \"{module}\"")))
}

/// Replace `path` with `contents` via a sibling temp file and rename,
/// keeping the original permission bits
fn write_replacing(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let permissions = fs::metadata(path)?.permissions();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_file, HOST_ENTRY};
    use tempfile::TempDir;

    const PLUGIN: &str = "github.com/abiosoft/caddy-git";

    fn entry(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("caddymain/run.go");
        write_file(&path, contents);
        path
    }

    fn count(path: &Path, needle: &str) -> usize {
        fs::read_to_string(path).unwrap().matches(needle).count()
    }

    #[test]
    fn adds_blank_import_to_group() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, HOST_ENTRY);

        assert_eq!(inject(&path, PLUGIN).unwrap(), InjectOutcome::Inserted);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\t_ \"github.com/abiosoft/caddy-git\"\n)"));
        assert!(text.contains("func Run()"));
    }

    #[test]
    fn second_injection_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, HOST_ENTRY);

        inject(&path, PLUGIN).unwrap();
        let once = fs::read(&path).unwrap();
        assert_eq!(inject(&path, PLUGIN).unwrap(), InjectOutcome::AlreadyPresent);

        assert_eq!(fs::read(&path).unwrap(), once);
        assert_eq!(count(&path, PLUGIN), 1);
    }

    #[test]
    fn several_modules_each_once() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, HOST_ENTRY);
        for module in ["github.com/a/one", "github.com/b/two", "github.com/a/one"] {
            inject(&path, module).unwrap();
        }
        assert_eq!(count(&path, "github.com/a/one"), 1);
        assert_eq!(count(&path, "github.com/b/two"), 1);
    }

    #[test]
    fn existing_named_import_counts_as_present() {
        let dir = TempDir::new().unwrap();
        let path = entry(
            &dir,
            "package main\n\nimport (\n\tgit \"github.com/abiosoft/caddy-git\"\n)\n\nvar _ = git.X\n",
        );
        assert_eq!(inject(&path, PLUGIN).unwrap(), InjectOutcome::AlreadyPresent);
    }

    #[test]
    fn single_import_gets_a_new_declaration() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, "package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println() }\n");

        inject(&path, PLUGIN).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("import \"fmt\"\nimport _ \"github.com/abiosoft/caddy-git\"\n"));
    }

    #[test]
    fn file_without_imports() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, "package main\n\nfunc main() {}\n");

        inject(&path, PLUGIN).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("package main\n\nimport _ \"github.com/abiosoft/caddy-git\"\n"));
    }

    #[test]
    fn group_closed_on_same_line() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, "package main\n\nimport (\"fmt\")\n\nfunc main() { fmt.Println() }\n");

        assert_eq!(inject(&path, PLUGIN).unwrap(), InjectOutcome::Inserted);
        assert_eq!(count(&path, PLUGIN), 1);
    }

    #[test]
    fn unparsable_file_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let broken = "package main\n\nimport (\n\t\"fmt\"\n\nfunc main() {\n";
        let path = entry(&dir, broken);

        let err = inject(&path, PLUGIN).unwrap_err();
        assert!(matches!(err, InjectError::Parse { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn rejects_quote_in_module() {
        let dir = TempDir::new().unwrap();
        let path = entry(&dir, HOST_ENTRY);

        let err = inject(&path, "github.com/x\"y").unwrap_err();
        assert!(matches!(err, InjectError::Serialize { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), HOST_ENTRY);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = inject(&dir.path().join("nope.go"), PLUGIN).unwrap_err();
        assert!(matches!(err, InjectError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn keeps_permissions_and_leaves_no_temp_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = entry(&dir, HOST_ENTRY);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        inject(&path, PLUGIN).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        let siblings = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(siblings, 1);
    }
}
