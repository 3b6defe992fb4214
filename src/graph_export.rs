//! Graphviz export of the dependency graph.

use std::fmt::Write;

use crate::address::Address;
use crate::descriptors::{ProducerDescriptor, ProducerKind};

/// Renders the graph as DOT.
///
/// Producer nodes are colored by kind, break points are outlined in red and
/// the synthetic `ROOT` is drawn as a point.
pub(crate) fn to_dot(edges: &[(Address, Address)], descriptors: &[ProducerDescriptor]) -> String {
    let mut output = String::new();
    output.push_str("digraph DependencyGraph {\n");
    output.push_str("  rankdir=TB;\n");
    output.push_str("  node [shape=box];\n\n");

    let mut nodes: Vec<&Address> = Vec::new();
    for (from, to) in edges {
        for node in [from, to] {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }

    for node in nodes {
        let producer = descriptors.iter().find(|d| &d.address == node);
        let (shape, color) = match producer.map(|d| d.kind) {
            _ if node.is_root() => ("point", "black"),
            Some(ProducerKind::Function) => ("ellipse", "lightyellow"),
            Some(ProducerKind::Component) => ("box", "lightgreen"),
            Some(ProducerKind::Constant) => ("box", "lightblue"),
            None if node.as_str().starts_with("[]") => ("box3d", "white"),
            None => ("box", "white"),
        };
        let outline = match producer {
            Some(d) if d.break_point => ", color=red, penwidth=2",
            _ => "",
        };
        let _ = writeln!(
            output,
            "  \"{}\" [shape={}, fillcolor={}, style=filled{}];",
            escape(node.as_str()),
            shape,
            color,
            outline
        );
    }

    output.push('\n');

    for (from, to) in edges {
        let _ = writeln!(output, "  \"{}\" -> \"{}\";", escape(from.as_str()), escape(to.as_str()));
    }

    output.push_str("}\n");
    output
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_lists_nodes_and_edges() {
        let a = Address::of::<u8>();
        let f = Address::from_type_name("fn(u8) -> u16");
        let edges = vec![(Address::root(), a.clone()), (a.clone(), f.clone())];
        let descriptors = vec![ProducerDescriptor {
            address: a.clone(),
            kind: ProducerKind::Constant,
            inputs: vec![],
            outputs: vec![a.clone()],
            implements: vec![],
            break_point: false,
        }];

        let dot = to_dot(&edges, &descriptors);
        assert!(dot.starts_with("digraph DependencyGraph {"));
        assert!(dot.contains("\"ROOT\" [shape=point"));
        assert!(dot.contains("\"u8\" [shape=box, fillcolor=lightblue"));
        assert!(dot.contains("\"u8\" -> \"func(u8) u16\";"));
    }
}
