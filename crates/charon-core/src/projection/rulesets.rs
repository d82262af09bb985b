//! WAF ruleset staging on disk (spec.md §4.1 step 4).
//!
//! Each `SecurityRuleSet` is rendered to `<name>-<content-hash>.conf` under
//! a rulesets directory owned exclusively by the projection engine. Writes
//! are write-temp-then-rename so a reader never observes a partial file;
//! files belonging to rulesets no longer referenced are removed.

use charon_types::SecurityRuleSet;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A ruleset that has been written to disk, ready to be referenced by path
/// from an emitted `CaddyHandler::CorazaWaf`.
#[derive(Debug, Clone)]
pub struct StagedRuleset {
    pub name: String,
    pub path: PathBuf,
}

fn file_name(ruleset: &SecurityRuleSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ruleset.content.as_bytes());
    let digest = hasher.finalize();
    let short_hash = digest.iter().take(8).map(|b| format!("{b:02x}")).collect::<String>();
    format!("{}-{}.conf", sanitize(&ruleset.name), short_hash)
}

/// Strip anything but alphanumerics/dash/underscore so a ruleset name can
/// never escape the rulesets directory.
fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

fn render(ruleset: &SecurityRuleSet) -> String {
    format!("{}\n{}\n", ruleset.mode.engine_directive(), ruleset.content)
}

/// Stage every ruleset in `active` under `dir`, pruning any `.conf` file in
/// `dir` that no longer corresponds to an active ruleset. Returns the
/// staged file for each input ruleset, keyed by ruleset name.
pub async fn stage(
    dir: &Path,
    active: &[SecurityRuleSet],
) -> std::io::Result<Vec<StagedRuleset>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut staged = Vec::with_capacity(active.len());
    let mut keep = HashSet::new();

    for ruleset in active {
        let name = file_name(ruleset);
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!(".{name}.tmp"));

        tokio::fs::write(&tmp_path, render(ruleset)).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        keep.insert(name);
        staged.push(StagedRuleset { name: ruleset.name.clone(), path: final_path });
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else { continue };
        if !file_name.ends_with(".conf") || keep.contains(file_name) {
            continue;
        }
        tokio::fs::remove_file(entry.path()).await?;
    }

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon_types::RuleSetMode;
    use uuid::Uuid;

    fn ruleset(name: &str, content: &str, mode: RuleSetMode) -> SecurityRuleSet {
        SecurityRuleSet { uuid: Uuid::new_v4(), name: name.into(), source_url: None, mode, content: content.into() }
    }

    #[tokio::test]
    async fn stages_and_prunes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let active = vec![ruleset("owasp", "SecRule ARGS \"@rx <script>\" \"id:1\"", RuleSetMode::Blocking)];
        let staged = stage(dir.path(), &active).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].path.exists());

        let content = tokio::fs::read_to_string(&staged[0].path).await.unwrap();
        assert!(content.starts_with("SecRuleEngine On\n"));

        // Dropping the ruleset from the active set prunes its staged file.
        let staged_again = stage(dir.path(), &[]).await.unwrap();
        assert!(staged_again.is_empty());
        assert!(!staged[0].path.exists());
    }

    #[tokio::test]
    async fn same_content_reuses_the_same_hashed_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = ruleset("owasp", "same content", RuleSetMode::Detection);
        let mut b = a.clone();
        b.uuid = Uuid::new_v4();
        let first = stage(dir.path(), std::slice::from_ref(&a)).await.unwrap();
        let second = stage(dir.path(), std::slice::from_ref(&b)).await.unwrap();
        assert_eq!(first[0].path, second[0].path);
    }
}
