use serde_json::json;

use crate::provider::{RepositoryFile, RepositorySpec};


/// Lower-cases the name and joins whitespace-separated words with `-`.
pub fn repository_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}


fn readme(name: &str, spec: &RepositorySpec) -> String {
    let mut readme = format!("# {}\n\n{}\n", name, spec.description);

    if !spec.tech_stack.is_empty() {
        readme.push_str("\n## Tech Stack\n\n");
        for tech in &spec.tech_stack {
            readme.push_str(&format!("- {}\n", tech));
        }
    }

    if !spec.learning_goals.is_empty() {
        readme.push_str("\n## Learning Goals\n\n");
        for goal in &spec.learning_goals {
            readme.push_str(&format!("- [ ] {}\n", goal));
        }
    }

    readme
}

const GITIGNORE: &str = "\
node_modules/
dist/
build/
.env
.env.local
*.log
.DS_Store
";

fn package_json(name: &str, spec: &RepositorySpec) -> String {
    let manifest = json!({
        "name": name,
        "version": "0.1.0",
        "private": true,
        "description": spec.description,
        "keywords": spec.tech_stack.iter().map(|tech| tech.to_lowercase()).collect::<Vec<_>>(),
        "scripts": {
            "dev": "vite",
            "build": "vite build",
            "preview": "vite preview"
        }
    });
    format!("{:#}\n", manifest)
}


/// Files committed after the repository was created: README, ignore file and manifest.
pub fn supplementary_files(name: &str, spec: &RepositorySpec) -> Vec<RepositoryFile> {
    let file = |path: &str, content: String| RepositoryFile {
        path: path.to_string(),
        message: format!("Add {}", path),
        content,
    };

    vec![
        file("README.md", readme(name, spec)),
        file(".gitignore", GITIGNORE.to_string()),
        file("package.json", package_json(name, spec)),
    ]
}


#[cfg(test)]
mod tests {
    use crate::provider::RepositorySpec;
    use crate::scaffold::{repository_name, supplementary_files};

    #[test]
    fn test_repository_name() {
        assert_eq!(repository_name("My Project"), "my-project");
        assert_eq!(repository_name("  Weather   Dashboard \t App "), "weather-dashboard-app");
        assert_eq!(repository_name("already-slugged"), "already-slugged");
    }

    #[test]
    fn test_supplementary_files() {
        let spec = RepositorySpec {
            name: "My Project".to_string(),
            description: "d".to_string(),
            private: false,
            tech_stack: vec!["React".to_string()],
            learning_goals: vec!["x".to_string()],
        };

        let files = supplementary_files("my-project", &spec);
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", ".gitignore", "package.json"]);

        assert!(files[0].content.starts_with("# my-project\n\nd\n"));
        assert!(files[0].content.contains("- React\n"));
        assert!(files[0].content.contains("- [ ] x\n"));
        assert_eq!(files[0].message, "Add README.md");

        let manifest: serde_json::Value = serde_json::from_str(&files[2].content).unwrap();
        assert_eq!(manifest["name"], "my-project");
        assert_eq!(manifest["keywords"][0], "react");
    }
}
