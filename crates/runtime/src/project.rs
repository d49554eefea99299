use {
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Name of the single editable source file in a playground project.
pub const ENTRY_FILE: &str = "index.ts";

/// Manifest file name, written once when the project is mounted.
pub const MANIFEST_FILE: &str = "package.json";

/// Source shown in a fresh playground before the first edit.
pub const DEFAULT_SOURCE: &str = r#"import express from "express";

const app = express();
const port = Number(process.env.PORT ?? 3000);

app.get("/", (_req, res) => {
  res.send("<h1>Hello from sandpit!</h1>");
});

app.listen(port, () => {
  console.log(`Server listening on port ${port}`);
});
"#;

/// A virtual file tree mounted into a sandbox session.
///
/// Paths are slash-separated and relative to the project root.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTree {
    entries: BTreeMap<String, TreeEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEntry {
    File { contents: String },
    Dir(ProjectTree),
}

impl ProjectTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, creating intermediate directories as needed.
    ///
    /// Empty path segments are ignored, so `a//b` and `a/b` are the same
    /// entry.
    pub fn insert_file(&mut self, path: &str, contents: impl Into<String>) {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let Some(first) = segments.next() else {
            return;
        };
        self.insert_at(first, segments, contents.into());
    }

    fn insert_at<'a>(
        &mut self,
        segment: &str,
        mut rest: impl Iterator<Item = &'a str>,
        contents: String,
    ) {
        match rest.next() {
            None => {
                self.entries
                    .insert(segment.to_string(), TreeEntry::File { contents });
            },
            Some(next) => {
                let entry = self
                    .entries
                    .entry(segment.to_string())
                    .or_insert_with(|| TreeEntry::Dir(ProjectTree::new()));
                // A file and a directory with the same name cannot coexist;
                // the directory wins.
                if let TreeEntry::File { .. } = entry {
                    *entry = TreeEntry::Dir(ProjectTree::new());
                }
                if let TreeEntry::Dir(dir) = entry {
                    dir.insert_at(next, rest, contents);
                }
            },
        }
    }

    /// Flatten the tree into `(path, contents)` pairs in sorted order.
    #[must_use]
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, entry) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match entry {
                TreeEntry::File { contents } => out.push((path, contents.as_str())),
                TreeEntry::Dir(dir) => dir.collect_files(&path, out),
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The fixed project scaffold: a manifest plus one editable source file.
///
/// The manifest is written once at mount time and never rewritten; only
/// [`ENTRY_FILE`] changes between runs.
#[must_use]
pub fn default_project(source: &str) -> ProjectTree {
    let mut tree = ProjectTree::new();
    tree.insert_file(MANIFEST_FILE, default_manifest());
    tree.insert_file(ENTRY_FILE, source);
    tree
}

fn default_manifest() -> String {
    let manifest = serde_json::json!({
        "name": "sandpit-app",
        "version": "1.0.0",
        "private": true,
        "type": "module",
        "scripts": {
            "start": "tsx index.ts",
        },
        "dependencies": {
            "@types/express": "^4.17.17",
            "express": "^4.18.0",
            "tsx": "^4.0.0",
            "typescript": "^5.0.0",
        },
    });
    serde_json::to_string_pretty(&manifest).unwrap_or_default()
}
