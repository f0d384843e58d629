//! The project file tree: a hierarchical, path-addressed document store.
//!
//! Every mutation is a pure function from one tree value to the next. The
//! rebuild walks from the root and copies only the ancestor chain of the
//! touched node; untouched siblings are shared by `Arc`, so a UI layer can
//! detect change by pointer equality and concurrent readers holding an old
//! snapshot never see a half-applied edit.

use serde::{Deserialize, Serialize};
use shared::error::TreeError;
use std::fmt;
use std::sync::Arc;

/// Longest allowed file or folder name.
pub const MAX_NAME_LEN: usize = 255;

/// File or folder payload. Serializes with a `type` tag so snapshots look
/// like the JSON the UI layer and the prompt context expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    File {
        #[serde(default)]
        content: String,
    },
    Folder {
        #[serde(default)]
        children: Vec<Arc<Node>>,
    },
}

/// One entry in the project tree.
///
/// `path` is derived from ancestry: root nodes have `path == name`, every
/// other node has `path == parent.path + "/" + name`. Paths are unique
/// across the whole tree because sibling names are unique per folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub path: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// A file node. The path is provisional until the node is inserted.
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            kind: NodeKind::File {
                content: content.into(),
            },
        }
    }

    /// An empty folder node.
    pub fn folder(name: impl Into<String>) -> Self {
        Self::folder_with(name, Vec::new())
    }

    /// A folder node with children. Child paths are rebased on insert.
    pub fn folder_with(name: impl Into<String>, children: Vec<Node>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            kind: NodeKind::Folder {
                children: children.into_iter().map(Arc::new).collect(),
            },
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content } => Some(content),
            NodeKind::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&[Arc<Node>]> {
        match &self.kind {
            NodeKind::Folder { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    /// Rebuild this node (and any subtree) with paths derived from
    /// `parent_path`. An empty parent means root level.
    fn rebased(&self, parent_path: &str) -> Node {
        let path = if parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", parent_path, self.name)
        };
        let kind = match &self.kind {
            NodeKind::File { content } => NodeKind::File {
                content: content.clone(),
            },
            NodeKind::Folder { children } => NodeKind::Folder {
                children: children
                    .iter()
                    .map(|child| Arc::new(child.rebased(&path)))
                    .collect(),
            },
        };
        Node {
            name: self.name.clone(),
            path,
            kind,
        }
    }
}

/// A rule a proposed node name breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameViolation {
    Empty,
    TooLong,
    ContainsSeparator,
    ContainsParentRef,
}

impl fmt::Display for NameViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameViolation::Empty => write!(f, "name is empty"),
            NameViolation::TooLong => write!(f, "name is longer than {} characters", MAX_NAME_LEN),
            NameViolation::ContainsSeparator => write!(f, "name contains a path separator"),
            NameViolation::ContainsParentRef => write!(f, "name contains \"..\""),
        }
    }
}

/// Check a proposed file or folder name. Returns every violated rule so the
/// UI can report them all at once.
pub fn validate_name(name: &str) -> Vec<NameViolation> {
    let mut violations = Vec::new();
    if name.is_empty() {
        violations.push(NameViolation::Empty);
    }
    if name.chars().count() > MAX_NAME_LEN {
        violations.push(NameViolation::TooLong);
    }
    if name.contains('/') || name.contains('\\') {
        violations.push(NameViolation::ContainsSeparator);
    }
    if name.contains("..") {
        violations.push(NameViolation::ContainsParentRef);
    }
    violations
}

/// The whole project tree: an ordered sequence of root nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathTree {
    roots: Vec<Arc<Node>>,
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree by inserting `nodes` at the root in order.
    pub fn from_roots(nodes: Vec<Node>) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        for node in nodes {
            tree = tree.insert("", node)?;
        }
        Ok(tree)
    }

    pub fn roots(&self) -> &[Arc<Node>] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes, folders included.
    pub fn len(&self) -> usize {
        fn count(nodes: &[Arc<Node>]) -> usize {
            nodes
                .iter()
                .map(|n| 1 + n.children().map_or(0, count))
                .sum()
        }
        count(&self.roots)
    }

    /// Exact-path lookup. Paths are unique, so the first match is the only
    /// one.
    pub fn find(&self, path: &str) -> Option<&Arc<Node>> {
        find_in(&self.roots, path)
    }

    /// A tree identical to this one except the file at `path` carries
    /// `content`. The input tree is untouched; `PathNotFound` if `path`
    /// does not resolve to a file.
    pub fn update(&self, path: &str, content: &str) -> Result<PathTree, TreeError> {
        match update_in(&self.roots, path, content) {
            Some(roots) => Ok(PathTree { roots }),
            None => Err(TreeError::PathNotFound(path.to_string())),
        }
    }

    /// Append `node` as the last child of the folder at `parent_path`, or
    /// to the root sequence when `parent_path` is empty. The inserted
    /// subtree gets its paths rebased onto the parent.
    pub fn insert(&self, parent_path: &str, node: Node) -> Result<PathTree, TreeError> {
        let violations = validate_name(&node.name);
        if !violations.is_empty() {
            let rules = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(TreeError::InvalidName(format!(
                "\"{}\": {}",
                node.name, rules
            )));
        }

        if parent_path.is_empty() {
            if self.roots.iter().any(|n| n.name == node.name) {
                return Err(TreeError::DuplicateName(node.name));
            }
            let mut roots = self.roots.clone();
            roots.push(Arc::new(node.rebased("")));
            return Ok(PathTree { roots });
        }

        insert_in(&self.roots, parent_path, &node).map(|roots| PathTree { roots })
    }

    /// Remove the node at `path` and, for folders, its entire subtree.
    /// Unknown paths are a no-op.
    pub fn remove(&self, path: &str) -> PathTree {
        PathTree {
            roots: remove_in(&self.roots, path).unwrap_or_else(|| self.roots.clone()),
        }
    }

    /// Pretty JSON snapshot of the whole tree, in the shape the prompt
    /// context and project export use.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "[]".to_string())
    }

    /// Paths of every file node, depth-first.
    pub fn file_paths(&self) -> Vec<String> {
        fn collect(nodes: &[Arc<Node>], out: &mut Vec<String>) {
            for node in nodes {
                match &node.kind {
                    NodeKind::File { .. } => out.push(node.path.clone()),
                    NodeKind::Folder { children } => collect(children, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }

    /// Depth-first first file, used for the initial selection.
    pub fn first_file_path(&self) -> Option<String> {
        self.file_paths().into_iter().next()
    }
}

/// True when `path` could live somewhere under the folder at `ancestor`.
fn is_descendant_path(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len() + 1
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn find_in<'a>(nodes: &'a [Arc<Node>], path: &str) -> Option<&'a Arc<Node>> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if let NodeKind::Folder { children } = &node.kind {
            if is_descendant_path(&node.path, path) {
                return find_in(children, path);
            }
        }
    }
    None
}

fn update_in(nodes: &[Arc<Node>], path: &str, content: &str) -> Option<Vec<Arc<Node>>> {
    for (i, node) in nodes.iter().enumerate() {
        if node.path == path {
            if !node.is_file() {
                return None;
            }
            let mut out = nodes.to_vec();
            out[i] = Arc::new(Node {
                name: node.name.clone(),
                path: node.path.clone(),
                kind: NodeKind::File {
                    content: content.to_string(),
                },
            });
            return Some(out);
        }
        if let NodeKind::Folder { children } = &node.kind {
            if is_descendant_path(&node.path, path) {
                let children = update_in(children, path, content)?;
                let mut out = nodes.to_vec();
                out[i] = Arc::new(Node {
                    name: node.name.clone(),
                    path: node.path.clone(),
                    kind: NodeKind::Folder { children },
                });
                return Some(out);
            }
        }
    }
    None
}

fn insert_in(
    nodes: &[Arc<Node>],
    parent_path: &str,
    node: &Node,
) -> Result<Vec<Arc<Node>>, TreeError> {
    for (i, cur) in nodes.iter().enumerate() {
        if cur.path == parent_path {
            let children = match &cur.kind {
                NodeKind::Folder { children } => children,
                NodeKind::File { .. } => {
                    return Err(TreeError::NotAFolder(parent_path.to_string()))
                }
            };
            if children.iter().any(|c| c.name == node.name) {
                return Err(TreeError::DuplicateName(node.name.clone()));
            }
            let mut children = children.clone();
            children.push(Arc::new(node.rebased(parent_path)));
            let mut out = nodes.to_vec();
            out[i] = Arc::new(Node {
                name: cur.name.clone(),
                path: cur.path.clone(),
                kind: NodeKind::Folder { children },
            });
            return Ok(out);
        }
        if let NodeKind::Folder { children } = &cur.kind {
            if is_descendant_path(&cur.path, parent_path) {
                let children = insert_in(children, parent_path, node)?;
                let mut out = nodes.to_vec();
                out[i] = Arc::new(Node {
                    name: cur.name.clone(),
                    path: cur.path.clone(),
                    kind: NodeKind::Folder { children },
                });
                return Ok(out);
            }
        }
    }
    Err(TreeError::PathNotFound(parent_path.to_string()))
}

fn remove_in(nodes: &[Arc<Node>], path: &str) -> Option<Vec<Arc<Node>>> {
    for (i, cur) in nodes.iter().enumerate() {
        if cur.path == path {
            let mut out = nodes.to_vec();
            out.remove(i);
            return Some(out);
        }
        if let NodeKind::Folder { children } = &cur.kind {
            if is_descendant_path(&cur.path, path) {
                let children = remove_in(children, path)?;
                let mut out = nodes.to_vec();
                out[i] = Arc::new(Node {
                    name: cur.name.clone(),
                    path: cur.path.clone(),
                    kind: NodeKind::Folder { children },
                });
                return Some(out);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> PathTree {
        PathTree::from_roots(vec![
            Node::folder_with(
                "src",
                vec![
                    Node::file("App.tsx", "export default function App() {}"),
                    Node::file("index.css", "body { margin: 0; }"),
                ],
            ),
            Node::file("index.html", "<html></html>"),
        ])
        .unwrap()
    }

    #[test]
    fn test_insert_then_find_returns_node() {
        let tree = sample_tree();
        let tree = tree.insert("src", Node::file("util.ts", "export {}")).unwrap();

        let node = tree.find("src/util.ts").expect("inserted file");
        assert_eq!(node.name, "util.ts");
        assert_eq!(node.path, "src/util.ts");
        assert_eq!(node.content(), Some("export {}"));
    }

    #[test]
    fn test_insert_rebases_subtree_paths() {
        let tree = sample_tree();
        let sub = Node::folder_with("assets", vec![Node::file("logo.svg", "<svg/>")]);
        let tree = tree.insert("src", sub).unwrap();

        assert!(tree.find("src/assets").is_some());
        assert_eq!(
            tree.find("src/assets/logo.svg").unwrap().path,
            "src/assets/logo.svg"
        );
    }

    #[test]
    fn test_update_is_copy_on_write() {
        let before = sample_tree();
        let after = before
            .update("src/App.tsx", "export default function App() { return null }")
            .unwrap();

        // New content visible in the new tree.
        assert_eq!(
            after.find("src/App.tsx").unwrap().content(),
            Some("export default function App() { return null }")
        );
        // The retained old snapshot still shows the old content.
        assert_eq!(
            before.find("src/App.tsx").unwrap().content(),
            Some("export default function App() {}")
        );
        // Untouched siblings are shared, not copied.
        assert!(Arc::ptr_eq(
            before.find("src/index.css").unwrap(),
            after.find("src/index.css").unwrap()
        ));
        assert!(Arc::ptr_eq(
            before.find("index.html").unwrap(),
            after.find("index.html").unwrap()
        ));
        // The ancestor chain was rebuilt.
        assert!(!Arc::ptr_eq(
            before.find("src").unwrap(),
            after.find("src").unwrap()
        ));
    }

    #[test]
    fn test_update_root_file() {
        let before = sample_tree();
        let after = before
            .update("index.html", "<html><body>Hi</body></html>")
            .unwrap();
        assert_eq!(
            after.find("index.html").unwrap().content(),
            Some("<html><body>Hi</body></html>")
        );
        assert_eq!(
            before.find("index.html").unwrap().content(),
            Some("<html></html>")
        );
    }

    #[test]
    fn test_update_missing_or_folder_path_is_not_found() {
        let tree = sample_tree();
        assert_eq!(
            tree.update("nope.txt", "x"),
            Err(TreeError::PathNotFound("nope.txt".to_string()))
        );
        // A folder path does not resolve to a file.
        assert_eq!(
            tree.update("src", "x"),
            Err(TreeError::PathNotFound("src".to_string()))
        );
    }

    #[test]
    fn test_duplicate_name_leaves_tree_unchanged() {
        let tree = PathTree::from_roots(vec![Node::file("a.css", ".a {}")]).unwrap();
        let err = tree.insert("", Node::file("a.css", ".b {}")).unwrap_err();
        assert_eq!(err, TreeError::DuplicateName("a.css".to_string()));
        // Original still shows the pre-existing file, not a merge.
        assert_eq!(tree.find("a.css").unwrap().content(), Some(".a {}"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_duplicate_name_inside_folder() {
        let tree = sample_tree();
        let err = tree
            .insert("src", Node::file("App.tsx", "dup"))
            .unwrap_err();
        assert_eq!(err, TreeError::DuplicateName("App.tsx".to_string()));
    }

    #[test]
    fn test_insert_into_file_is_not_a_folder() {
        let tree = sample_tree();
        let err = tree
            .insert("index.html", Node::file("x.js", ""))
            .unwrap_err();
        assert_eq!(err, TreeError::NotAFolder("index.html".to_string()));
    }

    #[test]
    fn test_insert_under_missing_parent() {
        let tree = sample_tree();
        let err = tree.insert("missing", Node::file("x.js", "")).unwrap_err();
        assert_eq!(err, TreeError::PathNotFound("missing".to_string()));
    }

    #[test]
    fn test_insert_rejects_invalid_names() {
        let tree = PathTree::new();
        assert!(matches!(
            tree.insert("", Node::file("a/b.txt", "")),
            Err(TreeError::InvalidName(_))
        ));
        assert!(matches!(
            tree.insert("", Node::file("", "")),
            Err(TreeError::InvalidName(_))
        ));
        assert!(matches!(
            tree.insert("", Node::file("..secret", "")),
            Err(TreeError::InvalidName(_))
        ));
    }

    #[test]
    fn test_remove_folder_drops_descendants() {
        let before = sample_tree();
        let after = before.remove("src");

        assert!(after.find("src").is_none());
        assert!(after.find("src/App.tsx").is_none());
        assert!(after.find("index.html").is_some());
        // Old snapshot keeps the subtree.
        assert!(before.find("src/App.tsx").is_some());
    }

    #[test]
    fn test_remove_unknown_path_is_noop() {
        let tree = sample_tree();
        let after = tree.remove("ghost.txt");
        assert_eq!(tree, after);
    }

    #[test]
    fn test_validate_name_rules() {
        assert_eq!(validate_name("ok.tsx"), vec![]);
        assert_eq!(validate_name(""), vec![NameViolation::Empty]);
        assert_eq!(
            validate_name("a/b"),
            vec![NameViolation::ContainsSeparator]
        );
        assert_eq!(
            validate_name("a\\b"),
            vec![NameViolation::ContainsSeparator]
        );
        assert_eq!(
            validate_name("..up"),
            vec![NameViolation::ContainsParentRef]
        );
        assert_eq!(
            validate_name(&"x".repeat(256)),
            vec![NameViolation::TooLong]
        );
    }

    #[test]
    fn test_sibling_name_prefix_is_not_a_descendant() {
        // "src2/x" must not be searched for under "src".
        let tree = PathTree::from_roots(vec![
            Node::folder("src"),
            Node::folder_with("src2", vec![Node::file("x.js", "1")]),
        ])
        .unwrap();
        assert_eq!(tree.find("src2/x.js").unwrap().content(), Some("1"));
        assert!(tree.find("src/x.js").is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let tree = PathTree::from_roots(vec![Node::file("index.html", "<html></html>")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&tree.to_json()).unwrap();
        assert_eq!(value[0]["name"], "index.html");
        assert_eq!(value[0]["type"], "file");
        assert_eq!(value[0]["path"], "index.html");
        assert_eq!(value[0]["content"], "<html></html>");
    }

    #[test]
    fn test_file_paths_depth_first() {
        let tree = sample_tree();
        assert_eq!(
            tree.file_paths(),
            vec!["src/App.tsx", "src/index.css", "index.html"]
        );
        assert_eq!(tree.first_file_path().as_deref(), Some("src/App.tsx"));
    }
}
