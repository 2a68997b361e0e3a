//! Bulk import of rule drafts from YAML/JSON documents, for seeding a
//! fresh store and migrating rule sets between deployments.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::RuleError;
use crate::rule::{ModRule, RuleDraft};
use crate::store::RuleStore;

/// Loads rule drafts from a file or from every `json`/`yaml`/`yml` file in
/// a directory. Duplicate `(kind, target, package)` triples across the
/// whole batch are rejected before anything is stored.
pub fn load_drafts(path: impl AsRef<Path>) -> Result<Vec<RuleDraft>, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::validation(format!(
            "rules path does not exist: {}",
            path.display()
        )));
    }

    let drafts = if path.is_dir() {
        load_from_directory(path)?
    } else {
        load_from_file(path)?
    };

    deduplicate(&drafts)?;
    Ok(drafts)
}

/// Validates and stores every draft in the document at `path`.
///
/// Each rule is an independent create: a validation failure aborts the
/// remainder of the import but already-created rules stay in the store.
pub fn import(
    store: &RuleStore,
    path: impl AsRef<Path>,
    created_by: &str,
) -> Result<Vec<ModRule>, RuleError> {
    let drafts = load_drafts(&path)?;
    let mut imported = Vec::with_capacity(drafts.len());
    for draft in drafts {
        imported.push(store.create(draft, created_by)?);
    }

    info!(
        path = %path.as_ref().display(),
        count = imported.len(),
        "imported rule documents"
    );
    Ok(imported)
}

fn load_from_directory(path: &Path) -> Result<Vec<RuleDraft>, RuleError> {
    let mut drafts = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::from_io(path, err))? {
        let entry = entry.map_err(|err| RuleError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }

        if let Some(ext) = entry.path().extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                let mut file_drafts = load_from_file(&entry.path())?;
                drafts.append(&mut file_drafts);
            }
        }
    }

    Ok(drafts)
}

fn load_from_file(path: &Path) -> Result<Vec<RuleDraft>, RuleError> {
    let raw = fs::read_to_string(path).map_err(|err| RuleError::from_io(path, err))?;
    parse_drafts(&raw, path)
}

fn parse_drafts(raw: &str, path: &Path) -> Result<Vec<RuleDraft>, RuleError> {
    let mut attempts = Vec::new();

    if let Ok(doc) = serde_yaml::from_str::<RuleDocument>(raw) {
        return Ok(doc.rules);
    }

    attempts.push("rules document".to_string());

    if let Ok(list) = serde_yaml::from_str::<Vec<RuleDraft>>(raw) {
        return Ok(list);
    }

    attempts.push("list".to_string());

    if let Ok(draft) = serde_yaml::from_str::<RuleDraft>(raw) {
        return Ok(vec![draft]);
    }

    attempts.push("single".to_string());

    let message = format!("unable to parse rules file using {:?} formats", attempts);
    Err(RuleError::parse_error(path.to_path_buf(), message))
}

fn deduplicate(drafts: &[RuleDraft]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for draft in drafts {
        let identity = (draft.kind, draft.target.clone(), draft.package_name.clone());
        if !seen.insert(identity) {
            return Err(RuleError::validation(format!(
                "duplicate rule for {} {} on package {}",
                draft.kind, draft.target, draft.package_name
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    rules: Vec<RuleDraft>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MatchKind;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = fs::File::create(dir.join(name)).expect("create fixture");
        file.write_all(content.as_bytes()).expect("write fixture");
    }

    #[test]
    fn loads_yaml_document_and_json_list_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "base.yaml",
            "rules:\n  - kind: tag\n    target: lab\n    package_name: Firefox\n",
        );
        write_file(
            dir.path(),
            "extra.json",
            r#"[{"kind": "owner", "target": "jdoe", "package_name": "Munki", "removal": true}]"#,
        );
        write_file(dir.path(), "ignored.txt", "not rules");

        let mut drafts = load_drafts(dir.path()).expect("load");
        drafts.sort_by_key(|d| d.package_name.clone());
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, MatchKind::Tag);
        assert!(drafts[1].removal);
    }

    #[test]
    fn single_draft_file_parses() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "one.yml",
            "kind: site\ntarget: hq\npackage_name: Chrome\nenabled: false\n",
        );

        let drafts = load_drafts(dir.path().join("one.yml")).expect("load");
        assert_eq!(drafts.len(), 1);
        assert!(!drafts[0].enabled);
    }

    #[test]
    fn duplicate_triples_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "dup.yaml",
            "rules:\n  - kind: tag\n    target: lab\n    package_name: Firefox\n  - kind: tag\n    target: lab\n    package_name: Firefox\n    removal: true\n",
        );

        let err = load_drafts(dir.path().join("dup.yaml")).expect_err("duplicates");
        assert!(matches!(err, RuleError::Validation(_)));
    }

    #[test]
    fn unparseable_file_names_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "broken.yaml", ": not yaml [");

        let err = load_drafts(dir.path().join("broken.yaml")).expect_err("parse failure");
        assert!(matches!(err, RuleError::Parse { .. }));
    }

    #[test]
    fn import_stores_every_draft_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "seed.yaml",
            "rules:\n  - kind: tag\n    target: lab\n    package_name: Firefox\n  - kind: owner\n    target: jdoe\n    package_name: Chrome\n",
        );

        let store = RuleStore::new();
        let imported = import(&store, dir.path(), "seeder").expect("import");
        assert_eq!(imported.len(), 2);
        assert_eq!(store.len(), 2);
        assert!(imported.iter().all(|rule| rule.created_by == "seeder"));
    }
}
