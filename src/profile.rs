//! One-shot inspection of the target tree: which ecosystems it uses and whether
//! it points any of them at a private registry.

use crate::config::FilterConfig;
use crate::models::ProjectProfile;
use ignore::WalkBuilder;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const MAX_DEPTH: usize = 8;
const MAX_MANIFESTS: usize = 50;

lazy_static! {
    static ref NPMRC_REGISTRY_RE: Regex =
        Regex::new(r"(?m)^\s*(@[\w.-]+:)?registry\s*=").expect("valid npmrc regex");
    static ref NPMRC_SCOPED_RE: Regex =
        Regex::new(r"(?m)^\s*@[\w.-]+:registry\s*=").expect("valid scoped npmrc regex");
    static ref YARNRC_REGISTRY_RE: Regex =
        Regex::new(r#"(?m)^\s*("?registry"?\s|npmRegistryServer:|npmScopes:)"#).expect("valid yarnrc regex");
    static ref PIP_INDEX_RE: Regex =
        Regex::new(r"(?m)^\s*(--index-url|--extra-index-url|-i\s|index-url\s*=|extra-index-url\s*=)")
            .expect("valid pip index regex");
}

/// Manifest file name → ecosystem.
fn manifest_ecosystem(file_name: &str) -> Option<&'static str> {
    match file_name {
        "package.json" => Some("npm"),
        "pyproject.toml" | "Pipfile" | "setup.py" | "setup.cfg" => Some("pypi"),
        "go.mod" => Some("go"),
        "Cargo.toml" => Some("cargo"),
        "Gemfile" => Some("rubygems"),
        "pom.xml" | "build.gradle" | "build.gradle.kts" => Some("maven"),
        "composer.json" => Some("packagist"),
        name if name.starts_with("requirements") && name.ends_with(".txt") => Some("pypi"),
        _ => None,
    }
}

pub fn profile(root: &Path, filters: &FilterConfig) -> ProjectProfile {
    let mut profile = ProjectProfile::default();
    let ignore_dirs: HashSet<String> = filters.ignore_dirs.iter().cloned().collect();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .max_depth(Some(MAX_DEPTH))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && ignore_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("profile walk error: {e}");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if let Some(ecosystem) = manifest_ecosystem(&name) {
            profile.ecosystems.insert(ecosystem.to_string());
            if profile.manifests.len() < MAX_MANIFESTS {
                let rel = path.strip_prefix(root).unwrap_or(path);
                profile.manifests.push(rel.to_string_lossy().to_string());
            }
        }

        inspect_file(&mut profile, path, &name);
    }

    if profile.has_private_registry_config {
        profile.characteristics.insert("private-registry-config".to_string());
    }
    if profile.ecosystems.len() > 1 {
        profile.characteristics.insert("multi-ecosystem".to_string());
    }
    profile.likely_internal = profile.has_private_registry_config
        || profile.characteristics.contains("private-package-json")
        || profile.characteristics.contains("npm-workspaces")
        || profile.characteristics.contains("monorepo");
    profile
}

fn inspect_file(profile: &mut ProjectProfile, path: &Path, name: &str) {
    let read = || match fs::read_to_string(path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::debug!(path = %path.display(), "skipping unreadable file: {e}");
            None
        }
    };

    match name {
        ".npmrc" => {
            if let Some(content) = read() {
                if NPMRC_REGISTRY_RE.is_match(&content) {
                    profile.has_private_registry_config = true;
                }
                if NPMRC_SCOPED_RE.is_match(&content) {
                    profile.characteristics.insert("scoped-registry".to_string());
                }
            }
        }
        ".yarnrc" | ".yarnrc.yml" => {
            if read().is_some_and(|c| YARNRC_REGISTRY_RE.is_match(&c)) {
                profile.has_private_registry_config = true;
            }
        }
        "pip.conf" | "pip.ini" | ".pypirc" | "settings.xml" => {
            profile.has_private_registry_config = true;
        }
        "pnpm-workspace.yaml" | "lerna.json" | "nx.json" | "turbo.json" => {
            profile.characteristics.insert("monorepo".to_string());
        }
        "package.json" => {
            if let Some(content) = read() {
                inspect_package_json(profile, &content);
            }
        }
        "pyproject.toml" => {
            if read().is_some_and(|c| c.contains("[[tool.poetry.source]]") || c.contains("[[tool.uv.index]]")) {
                profile.has_private_registry_config = true;
            }
        }
        "config" | "config.toml" if is_cargo_config(path) => {
            if read().is_some_and(|c| c.contains("[registries")) {
                profile.has_private_registry_config = true;
            }
        }
        n if n.starts_with("requirements") && n.ends_with(".txt") => {
            if read().is_some_and(|c| PIP_INDEX_RE.is_match(&c)) {
                profile.has_private_registry_config = true;
            }
        }
        _ => {}
    }
}

fn inspect_package_json(profile: &mut ProjectProfile, content: &str) {
    let json: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("unparseable package.json: {e}");
            return;
        }
    };
    if json.get("private").and_then(|v| v.as_bool()) == Some(true) {
        profile.characteristics.insert("private-package-json".to_string());
    }
    if json.get("workspaces").is_some() {
        profile.characteristics.insert("npm-workspaces".to_string());
    }
    if json
        .get("publishConfig")
        .and_then(|v| v.get("registry"))
        .is_some()
    {
        profile.has_private_registry_config = true;
    }
}

fn is_cargo_config(path: &Path) -> bool {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n == ".cargo")
        .unwrap_or(false)
}
