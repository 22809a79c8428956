use crate::reference::StackOutputReference;
use crate::visit;
use std::collections::HashSet;

/// Rewrites `|ref|STACK.OUTPUT` to `|ref|STACK<suffix>.OUTPUT` for managed stacks
#[derive(derive_new::new)]
pub(crate) struct SuffixRewriter<'a> {
    managed: &'a HashSet<String>,
    suffix: &'a str,
}

impl<'a> visit::VisitMut<String> for SuffixRewriter<'a> {
    fn visit_mut(&mut self, value: &mut String) {
        // malformed references are reported by validation, not here
        let Ok(Some(reference)) = StackOutputReference::parse(value) else {
            return;
        };

        if !self.managed.contains(&reference.stack) {
            return;
        }

        let renamed = format!("{}{}", reference.stack, self.suffix);
        *value = reference.with_stack(renamed).to_string();
        tracing::trace!(%value, "reference rewritten");
    }
}

/// Truncate `value` to at most `max` characters
pub(crate) fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::visit::VisitMut;
    use pretty_assertions::assert_eq;

    #[test]
    fn rewrites_only_managed_references() {
        let managed: HashSet<String> = ["vpc".to_string()].into();
        let mut rewriter = SuffixRewriter::new(&managed, "-it");

        let mut managed_ref = "|REF|vpc.Id".to_string();
        rewriter.visit_mut(&mut managed_ref);
        assert_eq!(managed_ref, "|ref|vpc-it.Id");

        let mut external_ref = "|ref|shared.Id".to_string();
        rewriter.visit_mut(&mut external_ref);
        assert_eq!(external_ref, "|ref|shared.Id");

        let mut literal = "vpc.Id".to_string();
        rewriter.visit_mut(&mut literal);
        assert_eq!(literal, "vpc.Id");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("äöü", 2), "äö");
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
