//! Script includes the client-side notebook renderer depends on.

/// Library scripts in load order. The entry point is appended after these.
pub const LIBRARY_SCRIPTS: [&str; 8] = [
    "es5-shim.min.js",
    "marked.min.js",
    "purify.min.js",
    "ansi_up.min.js",
    "prism.min.js",
    "katex.min.js",
    "katex-auto-render.min.js",
    "notebook.min.js",
];

/// Calls `render_notebook`; must load after every library script.
pub const ENTRY_POINT_SCRIPT: &str = "nbpreview.js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptAsset {
    pub name: &'static str,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ScriptManifest {
    base_url: String,
}

impl ScriptManifest {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn library_scripts(&self) -> Vec<ScriptAsset> {
        LIBRARY_SCRIPTS.iter().map(|name| self.asset(name)).collect()
    }

    pub fn entry_point(&self) -> ScriptAsset {
        self.asset(ENTRY_POINT_SCRIPT)
    }

    /// Every script, entry point last.
    pub fn ordered(&self) -> Vec<ScriptAsset> {
        let mut scripts = self.library_scripts();
        scripts.push(self.entry_point());
        scripts
    }

    fn asset(&self, name: &'static str) -> ScriptAsset {
        ScriptAsset {
            name,
            url: format!("{}/{name}", self.base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_loads_last() {
        let scripts = ScriptManifest::new("/static/nbpress/").ordered();

        assert_eq!(scripts.len(), LIBRARY_SCRIPTS.len() + 1);
        assert_eq!(scripts[0].url, "/static/nbpress/es5-shim.min.js");
        let last = scripts.last().expect("entry point");
        assert_eq!(last.name, ENTRY_POINT_SCRIPT);
        assert_eq!(last.url, "/static/nbpress/nbpreview.js");
    }
}
