//! Symbol enumeration for relocatable object images.

use object::{BinaryFormat, Object, ObjectSymbol, SymbolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Data,
}

/// A global definition found in an object image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedSymbol {
    pub name: String,
    pub kind: DefinitionKind,
    pub weak: bool,
}

impl DefinedSymbol {
    pub fn is_function(&self) -> bool {
        self.kind == DefinitionKind::Function
    }
}

/// Every externally visible definition in `image`, in symbol table order.
///
/// Mach-O names lose their leading underscore so callers always see the
/// C-level spelling.
pub fn defined_symbols(image: &[u8]) -> Result<Vec<DefinedSymbol>, object::Error> {
    let file = object::File::parse(image)?;
    let strip_underscore = file.format() == BinaryFormat::MachO;

    let mut defined = Vec::new();
    for symbol in file.symbols() {
        if symbol.is_undefined() || symbol.is_local() || !symbol.is_definition() {
            continue;
        }
        let kind = match symbol.kind() {
            SymbolKind::Text => DefinitionKind::Function,
            SymbolKind::Data | SymbolKind::Tls => DefinitionKind::Data,
            _ => continue,
        };
        let Ok(name) = symbol.name() else {
            continue;
        };
        let name = match name.strip_prefix('_') {
            Some(stripped) if strip_underscore => stripped,
            _ => name,
        };
        if name.is_empty() {
            continue;
        }
        defined.push(DefinedSymbol {
            name: name.to_string(),
            kind,
            weak: symbol.is_weak(),
        });
    }
    Ok(defined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_not_an_object() {
        assert!(defined_symbols(b"definitely not an object file").is_err());
    }
}
