use crate::ast::{Node, NodeKind};
use crate::errors::{Error, ErrorKind, Result};

/// Forms categorized by their compilation phase. The same classification
/// drives both type inference and evaluation.
#[derive(Default)]
pub struct ClassifiedForms<'a> {
    /// Directive declarations — always first.
    pub directives: Vec<&'a Node>,
    /// Bindings whose value is a literal; no inter-dependencies possible.
    pub constants: Vec<&'a Node>,
    /// Class and enum declarations.
    pub types: Vec<&'a Node>,
    /// Bindings with computed values, processed in dependency order.
    pub variables: Vec<&'a Node>,
    /// Function declarations and slot-bindings holding function literals.
    pub functions: Vec<&'a Node>,
    /// Everything else, executed in original order, last.
    pub non_declarations: Vec<&'a Node>,
}

pub fn classify_forms(forms: &[Node]) -> ClassifiedForms<'_> {
    let mut classified = ClassifiedForms::default();
    for form in forms {
        match &form.kind {
            NodeKind::Directive(_) => classified.directives.push(form),
            NodeKind::Class(_) | NodeKind::Enum(_) => classified.types.push(form),
            NodeKind::Fun(_) => classified.functions.push(form),
            NodeKind::Slot(slot) => {
                if matches!(slot.value.as_deref(), Some(Node { kind: NodeKind::Lambda(_), .. })) {
                    // Function-valued slots get the late body-resolution
                    // phase, same as named functions.
                    classified.functions.push(form);
                } else if is_constant_value(slot.value.as_deref()) {
                    classified.constants.push(form);
                } else {
                    classified.variables.push(form);
                }
            }
            _ => classified.non_declarations.push(form),
        }
    }
    classified
}

/// A compile-time constant: a literal, or no value at all (a bare type
/// declaration).
pub fn is_constant_value(value: Option<&Node>) -> bool {
    match value {
        None => true,
        Some(node) => matches!(
            node.kind,
            NodeKind::Int(_) | NodeKind::Str(_) | NodeKind::Bool(_) | NodeKind::Null
        ),
    }
}

/// Order declarations with Kahn's algorithm over the graph induced by
/// `declared_symbols` / `referenced_symbols`. A cycle is a hard error.
pub fn order_by_dependencies<'a>(declarers: &[&'a Node]) -> Result<Vec<&'a Node>> {
    if declarers.len() <= 1 {
        return Ok(declarers.to_vec());
    }

    let mut declared: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (i, declarer) in declarers.iter().enumerate() {
        for name in declarer.declared_symbols() {
            declared.insert(name, i);
        }
    }

    let n = declarers.len();
    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, declarer) in declarers.iter().enumerate() {
        for reference in declarer.referenced_symbols() {
            if let Some(&dep) = declared.get(&reference) {
                if dep != i && !dependencies[i].contains(&dep) {
                    dependencies[i].push(dep);
                }
            }
        }
    }

    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut result = Vec::with_capacity(n);
    let mut done = vec![false; n];

    // Pick the lowest-index ready node each round for determinism.
    loop {
        let next = (0..n).find(|&i| !done[i] && in_degree[i] == 0);
        let Some(current) = next else { break };
        done[current] = true;
        result.push(declarers[current]);
        for (dependent, deps) in dependencies.iter().enumerate() {
            if !done[dependent] && deps.contains(&current) {
                in_degree[dependent] -= 1;
            }
        }
    }

    if result.len() != n {
        let stuck: Vec<String> = (0..n)
            .filter(|&i| !done[i])
            .flat_map(|i| declarers[i].declared_symbols())
            .collect();
        return Err(Error::new(ErrorKind::CircularDependency(stuck)));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn forward_reference_orders_by_dependency() {
        let forms = parse("pub b = a + 1\npub a = f()\npub f(): Int! { 10 }").unwrap();
        let classified = classify_forms(&forms);
        assert_eq!(classified.variables.len(), 2);
        assert_eq!(classified.functions.len(), 1);
        let ordered = order_by_dependencies(&classified.variables).unwrap();
        assert_eq!(ordered[0].declared_symbols(), vec!["a".to_string()]);
        assert_eq!(ordered[1].declared_symbols(), vec!["b".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let forms = parse("pub x = y + 1\npub y = x + 1").unwrap();
        let classified = classify_forms(&forms);
        let err = order_by_dependencies(&classified.variables).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::errors::ErrorKind::CircularDependency(_)
        ));
    }

    #[test]
    fn literal_slots_are_constants() {
        let forms = parse("pub a = 10\npub b = a + 1\npub c = fn(): Int! { 1 }").unwrap();
        let classified = classify_forms(&forms);
        assert_eq!(classified.constants.len(), 1);
        assert_eq!(classified.variables.len(), 1);
        assert_eq!(classified.functions.len(), 1);
    }
}
