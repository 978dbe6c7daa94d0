use serde_json::{Map, Value};

/// Opaque key-value tree node owned by the application's layout persistence.
///
/// The graph core only reads and writes its own settings child; every other
/// property (position, size, docking) passes through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutNode {
    properties: Map<String, Value>,
}

impl LayoutNode {
    pub fn new() -> LayoutNode {
        LayoutNode::default()
    }

    pub fn from_json(json: &str) -> crate::error::Result<LayoutNode> {
        let properties = serde_json::from_str(json)?;
        Ok(LayoutNode { properties })
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(&self.properties)?)
    }

    pub fn child(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_child(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_owned(), value);
    }

    pub fn remove_child(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unrelated_properties_survive_json_roundtrip() {
        let mut node = LayoutNode::from_json(r#"{"x": 10, "y": 20, "docked": true}"#).unwrap();
        node.set_child("GraphSettings", json!({"autoscale": false}));

        let restored = LayoutNode::from_json(&node.to_json().unwrap()).unwrap();

        assert_eq!(restored, node);
        assert_eq!(restored.child("x"), Some(&json!(10)));
        assert!(LayoutNode::from_json("[1, 2]").is_err());
    }
}
