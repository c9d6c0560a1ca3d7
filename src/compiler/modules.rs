//! Emitted modules and component imports

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::card::CompiledCard;

/// Receives generated module sources and names them
pub trait ModuleEmitter: Send + Sync {
    /// Define a module owned by `card_url`, returning its specifier
    fn define(&self, card_url: &str, local_module_name: &str, source: &str) -> String;
}

/// Append-only module store shared between compiles
///
/// Specifiers are `<cardUrl>/<localModuleName>`. Defining a specifier again
/// replaces its source, which only differs after the card itself changed.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: RwLock<BTreeMap<String, String>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, specifier: &str) -> Option<String> {
        self.read().get(specifier).cloned()
    }

    /// All specifiers, sorted
    pub fn specifiers(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        match self.modules.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        match self.modules.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Specifier of a card-owned module
pub fn module_specifier(card_url: &str, local_module_name: &str) -> String {
    format!("{}/{}", card_url.trim_end_matches('/'), local_module_name)
}

impl ModuleEmitter for ModuleCache {
    fn define(&self, card_url: &str, local_module_name: &str, source: &str) -> String {
        let specifier = module_specifier(card_url, local_module_name);
        let mut modules = self.write();
        if modules.get(&specifier).map(String::as_str) != Some(source) {
            trace!(module = %specifier, "defining module");
            modules.insert(specifier.clone(), source.to_string());
        }
        specifier
    }
}

/// `rich-text` -> `RichText`
fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Import {
    local: String,
    card_url: String,
    module: Option<String>,
}

/// Component imports chosen while transforming one template
#[derive(Debug)]
pub struct Importer {
    suffix: String,
    imports: Vec<Import>,
}

impl Importer {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            imports: Vec::new(),
        }
    }

    /// Local name for `card`'s embedded component, stable per card
    pub fn name_for(&mut self, card: &CompiledCard) -> String {
        if let Some(import) = self.imports.iter().find(|i| i.card_url == card.url) {
            return import.local.clone();
        }

        let last = card
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let base = format!("{}{}", pascal_case(last), self.suffix);
        let mut local = base.clone();
        let mut n = 1;
        while self.imports.iter().any(|i| i.local == local) {
            n += 1;
            local = format!("{}{}", base, n);
        }

        self.imports.push(Import {
            local: local.clone(),
            card_url: card.url.clone(),
            module: card.embedded.as_ref().map(|meta| meta.module_name.clone()),
        });
        local
    }

    /// First imported card with no embedded module to import from
    pub fn missing_component(&self) -> Option<&str> {
        self.imports
            .iter()
            .find(|i| i.module.is_none())
            .map(|i| i.card_url.as_str())
    }

    /// Module source: import lines followed by the template
    pub fn render_module(&self, template: &str) -> String {
        let mut out = String::new();
        for import in &self.imports {
            if let Some(module) = &import.module {
                out.push_str(&format!("import {} from \"{}\";\n", import.local, module));
            }
        }
        out.push_str(template);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::FormatMeta;

    fn compound(url: &str) -> CompiledCard {
        let mut card = CompiledCard::new(url);
        card.embedded = Some(FormatMeta {
            module_name: module_specifier(url, "embedded.hbs"),
            ..FormatMeta::default()
        });
        card
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("date"), "Date");
        assert_eq!(pascal_case("rich-text"), "RichText");
        assert_eq!(pascal_case("blog_post"), "BlogPost");
    }

    #[test]
    fn test_define_is_idempotent() {
        let cache = ModuleCache::new();
        let first = cache.define("https://cards.test/person", "embedded.hbs", "{{@model.name}}");
        let second = cache.define("https://cards.test/person", "embedded.hbs", "{{@model.name}}");
        assert_eq!(first, "https://cards.test/person/embedded.hbs");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_define_replaces_changed_source() {
        let cache = ModuleCache::new();
        let specifier = cache.define("https://cards.test/person", "embedded.hbs", "a");
        cache.define("https://cards.test/person", "embedded.hbs", "b");
        assert_eq!(cache.get(&specifier).as_deref(), Some("b"));
    }

    #[test]
    fn test_importer_names_are_stable_and_unique() {
        let mut importer = Importer::new("Field");
        let date = compound("https://cardstack.com/base/date");
        let other_date = compound("https://cards.test/date");
        assert_eq!(importer.name_for(&date), "DateField");
        assert_eq!(importer.name_for(&other_date), "DateField2");
        assert_eq!(importer.name_for(&date), "DateField");
        assert!(importer.missing_component().is_none());
    }

    #[test]
    fn test_render_module_with_imports() {
        let mut importer = Importer::new("Field");
        importer.name_for(&compound("https://cardstack.com/base/date"));
        assert_eq!(
            importer.render_module("<DateField @model={{@model.birthdate}} />"),
            "import DateField from \"https://cardstack.com/base/date/embedded.hbs\";\n\
             <DateField @model={{@model.birthdate}} />"
        );
    }

    #[test]
    fn test_missing_component() {
        let mut importer = Importer::new("Field");
        importer.name_for(&CompiledCard::new("https://cards.test/blank"));
        assert_eq!(importer.missing_component(), Some("https://cards.test/blank"));
    }
}
