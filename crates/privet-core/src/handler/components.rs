use std::collections::BTreeSet;

use serde_json::Value;

use crate::JsonObject;

/// Copy of `component` keeping only `filter` keys (all keys when the filter
/// is empty). Nested `components` are filtered the same way.
pub fn clone_component(component: &JsonObject, filter: &BTreeSet<&str>) -> JsonObject {
    let mut clone = JsonObject::new();
    for (key, value) in component {
        if !filter.is_empty() && !filter.contains(key.as_str()) {
            continue;
        }
        let value = match value {
            Value::Object(children) if key == "components" => {
                Value::Object(clone_component_tree(children, filter))
            }
            other => other.clone(),
        };
        clone.insert(key.clone(), value);
    }
    clone
}

/// Apply [`clone_component`] to every entry of a `{name: component}` map.
/// Entries that are not objects are dropped.
pub fn clone_component_tree(tree: &JsonObject, filter: &BTreeSet<&str>) -> JsonObject {
    tree.iter()
        .filter_map(|(name, component)| {
            let component = component.as_object()?;
            Some((name.clone(), Value::Object(clone_component(component, filter))))
        })
        .collect()
}
