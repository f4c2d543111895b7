// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::HashMap;

use crate::{FieldId, Item, LookupField};

/// Every field of one form, addressable by id, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<LookupField>,
    index: HashMap<FieldId, usize>,
}

impl FieldRegistry {
    pub fn new(fields: Vec<LookupField>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.id().clone(), position))
            .collect();
        Self { fields, index }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&LookupField> {
        self.index.get(id).map(|&position| &self.fields[position])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut LookupField> {
        self.index
            .get(id)
            .map(|&position| &mut self.fields[position])
    }

    pub fn selection_of(&self, id: &str) -> Option<&Item> {
        self.get(id).and_then(LookupField::selection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LookupField> {
        self.fields.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LookupField> {
        self.fields.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::FieldRegistry;
    use crate::{FieldConfig, LookupField};
    use std::time::Duration;

    #[test]
    fn lookup_by_id_preserves_declaration_order() {
        let registry = FieldRegistry::new(vec![
            LookupField::new(FieldConfig::new("hospital", "h"), Duration::ZERO),
            LookupField::new(FieldConfig::new("service", "s"), Duration::ZERO),
        ]);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("service"));
        assert!(registry.get("office").is_none());
        let order: Vec<&str> = registry.iter().map(|field| field.id().as_str()).collect();
        assert_eq!(order, vec!["hospital", "service"]);
        assert_eq!(registry.selection_of("hospital"), None);
    }
}
