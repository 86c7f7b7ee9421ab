//! Generates an ASCII representation of a directory tree.

use super::Node;

/// A utility struct for rendering node trees as text outlines.
///
/// This struct is stateless and provides methods as associated functions.
pub struct TreeGenerator;

impl TreeGenerator {
    /// Generates a string representing the tree below `root`.
    ///
    /// Children are rendered in the order the tree builder produced them.
    pub fn generate_tree(root: &Node) -> String {
        let mut result = format!("{}/\n", root.name);
        Self::render_children(root.children(), &mut result, "");
        result
    }

    /// Renders every root of a forest, separated by blank lines.
    pub fn generate_forest(forest: &[Node]) -> String {
        forest
            .iter()
            .map(Self::generate_tree)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Recursively renders a list of sibling nodes into `result`.
    fn render_children(children: &[Node], result: &mut String, prefix: &str) {
        for (i, node) in children.iter().enumerate() {
            let is_last = i == children.len() - 1;
            let connector = if is_last { "└── " } else { "├── " };
            let suffix = if node.is_folder() { "/" } else { "" };

            result.push_str(&format!("{prefix}{connector}{}{suffix}\n", node.name));

            if !node.children().is_empty() {
                let new_prefix = if is_last {
                    format!("{prefix}    ")
                } else {
                    format!("{prefix}│   ")
                };
                Self::render_children(node.children(), result, &new_prefix);
            }
        }
    }
}
