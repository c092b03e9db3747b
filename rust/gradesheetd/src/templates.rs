use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};

pub const TEMPLATE_EXTENSION: &str = "xlsx";

/// Keep `[A-Za-z0-9_-]` only, so a class name can never walk out of the
/// templates root.
pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn has_template_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(TEMPLATE_EXTENSION))
}

fn class_dir(root: &Path, class: &str) -> anyhow::Result<PathBuf> {
    let segment = sanitize_segment(class);
    if segment.is_empty() {
        return Err(anyhow!("class name has no usable characters: {:?}", class));
    }
    Ok(root.join(segment))
}

/// Sorted `.xlsx` file names in `<root>/<class>`. A missing folder lists nothing.
pub fn list_templates(root: &Path, class: &str) -> anyhow::Result<Vec<String>> {
    let dir = class_dir(root, class)?;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for ent in std::fs::read_dir(&dir)
        .with_context(|| format!("failed to list {}", dir.to_string_lossy()))?
    {
        let ent = ent?;
        let p = ent.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if has_template_extension(name) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn template_path(root: &Path, class: &str, file: &str) -> anyhow::Result<PathBuf> {
    let dir = class_dir(root, class)?;
    let base = Path::new(file)
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("invalid template file name: {:?}", file))?;
    if base != file || !has_template_extension(base) {
        return Err(anyhow!("invalid template file name: {:?}", file));
    }
    Ok(dir.join(base))
}

pub fn read_template(root: &Path, class: &str, file: &str) -> anyhow::Result<Vec<u8>> {
    let path = template_path(root, class, file)?;
    std::fs::read(&path).with_context(|| format!("failed to read template {}", path.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_traversal() {
        assert_eq!(sanitize_segment("../../etc"), "etc");
        assert_eq!(sanitize_segment("3AS_sci-1"), "3AS_sci-1");
        assert_eq!(sanitize_segment("3 AS/é"), "3AS");
    }

    #[test]
    fn lists_only_xlsx_files_sorted() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("3AS");
        std::fs::create_dir_all(dir.join("nested.xlsx")).expect("mkdir");
        for name in ["b_T2.xlsx", "a_T1.XLSX", "notes.csv", "old.xls"] {
            std::fs::write(dir.join(name), b"x").expect("write");
        }
        let names = list_templates(root.path(), "../3AS").expect("list");
        assert_eq!(names, vec!["a_T1.XLSX", "b_T2.xlsx"]);
        assert!(list_templates(root.path(), "4AM").expect("list").is_empty());
        assert!(list_templates(root.path(), "///").is_err());
    }

    #[test]
    fn template_path_rejects_other_files() {
        let root = Path::new("/srv/templates");
        assert!(template_path(root, "3AS", "../secret.xlsx").is_err());
        assert!(template_path(root, "3AS", "notes.csv").is_err());
        assert_eq!(
            template_path(root, "3AS", "t1.xlsx").expect("path"),
            root.join("3AS").join("t1.xlsx")
        );
    }
}
