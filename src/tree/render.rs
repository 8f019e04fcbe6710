//! ASCII rendering of the scope tree.

use super::TreeNode;

const IN_SCOPE: char = '●';
const EXCLUDED: char = '✗';
const OUT_OF_SCOPE: char = '◇';

/// Get the scope symbol for a node.
fn scope_symbol(node: &TreeNode) -> char {
    if node.is_in_scope() {
        IN_SCOPE
    } else if node.is_excluded_from_scope() {
        EXCLUDED
    } else {
        OUT_OF_SCOPE
    }
}

/// Render the tree below `root` as ASCII art with scope symbols.
///
/// Example output:
/// ```text
/// ● https://example.com
/// ├── ● api
/// │   └── ● users
/// └── ✗ admin
/// ◇ https://cdn.example.net
/// ```
pub fn render_tree(root: &TreeNode) -> String {
    let mut output = String::new();
    for origin in root.children() {
        render_node(&mut output, origin, "", true, true);
    }
    output
}

/// Recursively render a node and its children.
fn render_node(output: &mut String, node: &TreeNode, prefix: &str, is_last: bool, is_origin: bool) {
    if !is_origin {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
    }
    output.push(scope_symbol(node));
    output.push(' ');
    output.push_str(node.name());
    output.push('\n');

    let child_prefix = if is_origin {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    let count = node.children().count();
    for (i, child) in node.children().enumerate() {
        render_node(output, child, &child_prefix, i == count - 1, false);
    }
}
