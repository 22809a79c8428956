use super::{VisitMut, VisitStringsMut};
use crate::config::{ParameterValue, StackConfig};

impl VisitStringsMut for ParameterValue {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<String>) {
        match self {
            ParameterValue::String(string) => visitor.visit_mut(string),
            ParameterValue::List(items) => {
                for item in items {
                    item.visit_strings_mut(visitor);
                }
            }
            ParameterValue::Bool(_)
            | ParameterValue::Int(_)
            | ParameterValue::Float(_)
            | ParameterValue::Other(_) => {}
        }
    }
}

impl VisitStringsMut for StackConfig {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<String>) {
        for value in self.parameters.values_mut() {
            value.visit_strings_mut(visitor);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn visits_list_elements() {
        let mut value = ParameterValue::from(vec![
            ParameterValue::from("a"),
            ParameterValue::from(1i64),
            ParameterValue::from(vec!["b"]),
        ]);

        let mut seen = vec![];
        value.visit_strings_mut(&mut |s: &mut String| {
            seen.push(s.clone());
            s.make_ascii_uppercase();
        });

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(value.strings(), vec!["A", "B"]);
    }
}
