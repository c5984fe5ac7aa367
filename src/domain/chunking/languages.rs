//! Per-language grammar lookup and AST node extraction tables.
//!
//! The extraction sets are the tuning point for chunk granularity: a node
//! whose kind appears in the set becomes a candidate chunk. Import kinds are
//! collected separately so contiguous top-level imports collapse into one
//! chunk instead of dozens of one-liners.

use crate::domain::types::Language;

/// Tree-sitter grammar for a language, `None` when unsupported.
pub fn grammar(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::language()),
        Language::Python => Some(tree_sitter_python::language()),
        Language::JavaScript => Some(tree_sitter_javascript::language()),
        Language::TypeScript => Some(tree_sitter_typescript::language_typescript()),
        Language::Java => Some(tree_sitter_java::language()),
        Language::Go => Some(tree_sitter_go::language()),
        _ => None,
    }
}

/// Whether the AST splitter can parse this language.
pub fn is_supported(language: Language) -> bool {
    grammar(language).is_some()
}

/// Node kinds extracted as candidate chunks.
pub fn extraction_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Rust => &[
            "function_item",
            "struct_item",
            "enum_item",
            "union_item",
            "trait_item",
            "impl_item",
            "mod_item",
            "macro_definition",
            "const_item",
            "static_item",
            "type_item",
        ],
        Language::Python => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        Language::JavaScript => &[
            "function_declaration",
            "generator_function_declaration",
            "class_declaration",
            "method_definition",
            "lexical_declaration",
            "variable_declaration",
            "export_statement",
        ],
        Language::TypeScript => &[
            "function_declaration",
            "generator_function_declaration",
            "class_declaration",
            "method_definition",
            "interface_declaration",
            "type_alias_declaration",
            "enum_declaration",
            "internal_module",
            "lexical_declaration",
            "variable_declaration",
            "export_statement",
        ],
        Language::Java => &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "record_declaration",
            "method_declaration",
            "constructor_declaration",
        ],
        Language::Go => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
            "const_declaration",
            "var_declaration",
        ],
        _ => &[],
    }
}

/// Node kinds grouped into a single leading import chunk.
pub fn import_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Rust => &["use_declaration", "extern_crate_declaration"],
        Language::Python => &["import_statement", "import_from_statement"],
        Language::JavaScript | Language::TypeScript => &["import_statement"],
        Language::Java => &["import_declaration", "package_declaration"],
        Language::Go => &["import_declaration", "package_clause"],
        _ => &[],
    }
}

/// Map a tree-sitter node kind to the `nodeKind` metadata label.
pub fn kind_label(kind: &str) -> &'static str {
    match kind {
        "function_item" | "function_declaration" | "function_definition"
        | "generator_function_declaration" | "decorated_definition" => "function",
        "method_definition" | "method_declaration" | "constructor_declaration" => "method",
        "class_declaration" | "class_definition" => "class",
        "struct_item" => "struct",
        "union_item" => "union",
        "enum_item" | "enum_declaration" => "enum",
        "trait_item" => "trait",
        "interface_declaration" => "interface",
        "impl_item" => "impl",
        "mod_item" | "internal_module" => "module",
        "record_declaration" => "record",
        "macro_definition" => "macro",
        "type_item" | "type_alias_declaration" | "type_declaration" => "type",
        "lexical_declaration" | "variable_declaration" | "const_item" | "static_item"
        | "const_declaration" | "var_declaration" => "variable",
        "export_statement" => "export",
        "use_declaration" | "extern_crate_declaration" | "import_statement"
        | "import_from_statement" | "import_declaration" => "import",
        _ => "block",
    }
}
