use cpp_demangle::{DemangleOptions, Symbol};

/// Demangle an Itanium C++ symbol name.
///
/// Names that are not mangled (extern "C" exports, data symbols) or that the
/// demangler rejects are returned unchanged.
pub fn demangle(linkable: &str) -> String {
    if !linkable.starts_with("_Z") {
        return linkable.to_string();
    }

    Symbol::new(linkable.as_bytes())
        .ok()
        .and_then(|symbol| symbol.demangle(&DemangleOptions::default()).ok())
        .unwrap_or_else(|| linkable.to_string())
}

/// Split the parameter list out of a demangled function name.
///
/// `"process(float const* const*, unsigned int)"` yields
/// `Some(["float const* const*", "unsigned int"])`; names without a
/// parameter list yield `None`.
pub fn parameter_list(demangled: &str) -> Option<Vec<String>> {
    let open = demangled.find('(')?;
    let close = demangled.rfind(')')?;
    if close < open {
        return None;
    }

    let inner = demangled[open + 1..close].trim();
    if inner.is_empty() || inner == "void" {
        return Some(Vec::new());
    }

    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                params.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    params.push(current.trim().to_string());
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demangles_free_functions() {
        assert_eq!(demangle("_Z3addii"), "add(int, int)");
        assert_eq!(demangle("_Z7add_cxxii"), "add_cxx(int, int)");
    }

    #[test]
    fn leaves_c_names_alone() {
        assert_eq!(demangle("process"), "process");
        assert_eq!(demangle("g_params"), "g_params");
    }

    #[test]
    fn invalid_mangling_falls_back_to_input() {
        assert_eq!(demangle("_Z"), "_Z");
    }

    #[test]
    fn splits_parameters_at_top_level_only() {
        assert_eq!(
            parameter_list("f(std::pair<int, int>, float*)"),
            Some(vec!["std::pair<int, int>".to_string(), "float*".to_string()])
        );
        assert_eq!(parameter_list("destroy()"), Some(Vec::new()));
        assert_eq!(parameter_list("process"), None);
    }
}
