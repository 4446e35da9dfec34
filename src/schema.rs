//! Compiled XML Schema model
//!
//! The weekly schedule format is governed by one XSD, so instead of binding
//! a general-purpose validation library this module compiles the subset of
//! XML Schema that document (and plausible revisions of it) uses: named
//! simple types with restriction facets, complex types built from a single
//! sequence with occurrence bounds, element refs, required attributes, and
//! the builtins string/boolean/integer/positiveInteger/float/time.
//!
//! Compilation resolves every reference up front, so a `Schema` handed to
//! the validator can never dangle.

use std::collections::HashMap;

use crate::error::{Result, ScheduleXmlError};
use crate::tree::{Element, local_name};

/// Built-in XSD primitive types the schedule schema draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    String,
    Boolean,
    Integer,
    PositiveInteger,
    Float,
    Time,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "integer" | "int" | "long" => Some(Self::Integer),
            "positiveInteger" => Some(Self::PositiveInteger),
            "float" | "double" | "decimal" => Some(Self::Float),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

/// A simple type: a builtin base narrowed by optional inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleType {
    pub base: Builtin,
    pub min_inclusive: Option<f64>,
    pub max_inclusive: Option<f64>,
}

impl SimpleType {
    pub fn of(base: Builtin) -> Self {
        Self {
            base,
            min_inclusive: None,
            max_inclusive: None,
        }
    }
}

/// Reference to the type of an element declaration.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(String),
    InlineComplex(Box<ComplexType>),
}

/// Attribute declaration inside a complex type.
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: String,
    pub type_name: String,
    pub required: bool,
}

/// Upper occurrence bound of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

/// One slot of a sequence content model.
#[derive(Debug, Clone)]
pub struct Particle {
    pub term: Term,
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
}

impl Particle {
    /// Whether one more occurrence is allowed on top of `count`.
    pub fn allows_another(&self, count: u32) -> bool {
        match self.max_occurs {
            MaxOccurs::Unbounded => true,
            MaxOccurs::Bounded(max) => count < max,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementDecl),
    Ref(String),
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: String,
    pub type_ref: TypeRef,
}

/// Complex type: a sequence of particles plus attribute declarations.
#[derive(Debug, Clone, Default)]
pub struct ComplexType {
    pub sequence: Vec<Particle>,
    pub attributes: Vec<AttributeDecl>,
}

/// A compiled, reference-checked schema.
#[derive(Debug, Default)]
pub struct Schema {
    simple_types: HashMap<String, SimpleType>,
    complex_types: HashMap<String, ComplexType>,
    globals: HashMap<String, ElementDecl>,
}

/// A type name resolved against a schema.
pub enum ResolvedType<'a> {
    Simple(SimpleType),
    Complex(&'a ComplexType),
}

impl Schema {
    /// Global element declaration by name (root elements and ref targets).
    pub fn global(&self, name: &str) -> Option<&ElementDecl> {
        self.globals.get(name)
    }

    /// Resolve a type name: builtins first (with or without an `xs:`
    /// prefix), then named simple and complex types.
    pub fn resolve(&self, name: &str) -> Option<ResolvedType<'_>> {
        let local = local_name(name);
        if let Some(builtin) = Builtin::from_name(local) {
            return Some(ResolvedType::Simple(SimpleType::of(builtin)));
        }
        if let Some(simple) = self.simple_types.get(local) {
            return Some(ResolvedType::Simple(*simple));
        }
        self.complex_types.get(local).map(ResolvedType::Complex)
    }
}

/// Compile a parsed XSD document into a [`Schema`]. `source_name` labels
/// errors ("embedded", the remote URL, ...).
pub fn compile(root: &Element, source_name: &str) -> Result<Schema> {
    let fail = |details: String| ScheduleXmlError::SchemaCompile {
        source_name: source_name.to_string(),
        details,
    };

    if root.local_tag() != "schema" {
        return Err(fail(format!("expected xs:schema root, found '{}'", root.tag)));
    }

    let mut schema = Schema::default();
    for child in &root.children {
        match child.local_tag() {
            "simpleType" => {
                let name = required_attr(child, "name").map_err(&fail)?;
                let simple = compile_simple_type(child).map_err(&fail)?;
                schema.simple_types.insert(name, simple);
            }
            "complexType" => {
                let name = required_attr(child, "name").map_err(&fail)?;
                let complex = compile_complex_type(child).map_err(&fail)?;
                schema.complex_types.insert(name, complex);
            }
            "element" => {
                let decl = compile_element_decl(child).map_err(&fail)?;
                schema.globals.insert(decl.name.clone(), decl);
            }
            // annotation/import/include are outside the supported subset
            // and carry nothing this schema needs.
            _ => {}
        }
    }

    check_references(&schema).map_err(fail)?;
    Ok(schema)
}

fn required_attr(element: &Element, name: &str) -> std::result::Result<String, String> {
    element
        .attr(name)
        .map(str::to_string)
        .ok_or_else(|| format!("<{}> missing '{}' attribute", element.tag, name))
}

fn compile_simple_type(element: &Element) -> std::result::Result<SimpleType, String> {
    let restriction = element
        .children
        .iter()
        .find(|c| c.local_tag() == "restriction")
        .ok_or_else(|| format!("simpleType '{}' has no restriction", element.attr("name").unwrap_or("?")))?;

    let base_name = required_attr(restriction, "base")?;
    let base = Builtin::from_name(local_name(&base_name))
        .ok_or_else(|| format!("unsupported restriction base '{base_name}'"))?;

    let mut simple = SimpleType::of(base);
    for facet in &restriction.children {
        let value = facet.attr("value");
        match facet.local_tag() {
            "minInclusive" => simple.min_inclusive = parse_facet(value)?,
            "maxInclusive" => simple.max_inclusive = parse_facet(value)?,
            "annotation" => {}
            other => return Err(format!("unsupported facet '{other}'")),
        }
    }
    Ok(simple)
}

fn parse_facet(value: Option<&str>) -> std::result::Result<Option<f64>, String> {
    let value = value.ok_or_else(|| "facet missing 'value' attribute".to_string())?;
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| format!("facet value '{value}' is not numeric"))
}

fn compile_complex_type(element: &Element) -> std::result::Result<ComplexType, String> {
    let mut complex = ComplexType::default();
    for child in &element.children {
        match child.local_tag() {
            "sequence" => {
                for particle in &child.children {
                    if particle.local_tag() != "element" {
                        return Err(format!(
                            "unsupported content particle '{}'",
                            particle.tag
                        ));
                    }
                    complex.sequence.push(compile_particle(particle)?);
                }
            }
            "attribute" => {
                complex.attributes.push(AttributeDecl {
                    name: required_attr(child, "name")?,
                    type_name: required_attr(child, "type")?,
                    required: child.attr("use") == Some("required"),
                });
            }
            "annotation" => {}
            other => return Err(format!("unsupported complexType child '{other}'")),
        }
    }
    Ok(complex)
}

fn compile_particle(element: &Element) -> std::result::Result<Particle, String> {
    let min_occurs = match element.attr("minOccurs") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| format!("invalid minOccurs '{raw}'"))?,
        None => 1,
    };
    let max_occurs = match element.attr("maxOccurs") {
        Some("unbounded") => MaxOccurs::Unbounded,
        Some(raw) => MaxOccurs::Bounded(
            raw.parse::<u32>()
                .map_err(|_| format!("invalid maxOccurs '{raw}'"))?,
        ),
        None => MaxOccurs::Bounded(1),
    };

    let term = match element.attr("ref") {
        Some(target) => Term::Ref(local_name(target).to_string()),
        None => Term::Element(compile_element_decl(element)?),
    };

    Ok(Particle {
        term,
        min_occurs,
        max_occurs,
    })
}

fn compile_element_decl(element: &Element) -> std::result::Result<ElementDecl, String> {
    let name = required_attr(element, "name")?;
    let type_ref = if let Some(type_name) = element.attr("type") {
        TypeRef::Named(type_name.to_string())
    } else if let Some(inline) = element
        .children
        .iter()
        .find(|c| c.local_tag() == "complexType")
    {
        TypeRef::InlineComplex(Box::new(compile_complex_type(inline)?))
    } else {
        return Err(format!("element '{name}' has no type"));
    };
    Ok(ElementDecl { name, type_ref })
}

/// Verify that every named type and element ref resolves, so validation
/// never encounters a dangling reference.
fn check_references(schema: &Schema) -> std::result::Result<(), String> {
    let check_type_ref = |type_ref: &TypeRef| match type_ref {
        TypeRef::Named(name) => {
            if schema.resolve(name).is_none() {
                Err(format!("unresolved type reference '{name}'"))
            } else {
                Ok(())
            }
        }
        TypeRef::InlineComplex(_) => Ok(()),
    };

    let mut pending: Vec<&ComplexType> = schema.complex_types.values().collect();
    for decl in schema.globals.values() {
        if let TypeRef::InlineComplex(inline) = &decl.type_ref {
            pending.push(inline.as_ref());
        }
        check_type_ref(&decl.type_ref)?;
    }

    while let Some(complex) = pending.pop() {
        for particle in &complex.sequence {
            match &particle.term {
                Term::Ref(target) => {
                    if schema.global(target).is_none() {
                        return Err(format!("unresolved element ref '{target}'"));
                    }
                }
                Term::Element(decl) => {
                    if let TypeRef::InlineComplex(inline) = &decl.type_ref {
                        pending.push(inline.as_ref());
                    }
                    check_type_ref(&decl.type_ref)?;
                }
            }
        }
        for attribute in &complex.attributes {
            if !matches!(
                schema.resolve(&attribute.type_name),
                Some(ResolvedType::Simple(_))
            ) {
                return Err(format!(
                    "attribute '{}' has unresolved simple type '{}'",
                    attribute.name, attribute.type_name
                ));
            }
        }
    }
    Ok(())
}
