use crate::symbol::NameId;
use parking_lot::RwLock;

/// Unique identifier for a type in the term table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

/// Unique identifier for an object (a problem constant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

/// Unique identifier for a variable (a schema parameter or a fresh
/// variable introduced during search).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u32);

impl ObjectId {
    /// Raw index (for display).
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        ObjectId(raw)
    }
}

impl VariableId {
    /// Raw index (for display).
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        VariableId(raw)
    }
}

/// A term is either a problem object or a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    Object(ObjectId),
    Variable(VariableId),
}

impl Term {
    /// The term as an object, if it is one.
    pub fn as_object(self) -> Option<ObjectId> {
        match self {
            Term::Object(o) => Some(o),
            Term::Variable(_) => None,
        }
    }

    /// The term as a variable, if it is one.
    pub fn as_variable(self) -> Option<VariableId> {
        match self {
            Term::Object(_) => None,
            Term::Variable(v) => Some(v),
        }
    }

    pub fn is_variable(self) -> bool {
        matches!(self, Term::Variable(_))
    }
}

#[derive(Debug)]
struct TypeEntry {
    name: NameId,
    /// Direct supertype; the root type has none.
    parent: Option<TypeId>,
}

#[derive(Debug)]
struct ObjectEntry {
    name: NameId,
    ty: TypeId,
}

#[derive(Debug)]
struct VariableEntry {
    /// Display name; fresh variables introduced during search have none.
    name: Option<NameId>,
    ty: TypeId,
}

/// Typed storage for objects and variables.
///
/// The table is append-only and shared by reference between the domain,
/// the problem, and the search: link installation freshens quantified
/// effect parameters mid-search, so writes go through interior
/// mutability.
#[derive(Debug)]
pub struct TermTable {
    types: RwLock<Vec<TypeEntry>>,
    objects: RwLock<Vec<ObjectEntry>>,
    variables: RwLock<Vec<VariableEntry>>,
}

impl TermTable {
    /// Create a table with a single root type of the given name.
    pub fn new(root_type_name: NameId) -> Self {
        let table = Self {
            types: RwLock::new(Vec::new()),
            objects: RwLock::new(Vec::new()),
            variables: RwLock::new(Vec::new()),
        };
        table.types.write().push(TypeEntry {
            name: root_type_name,
            parent: None,
        });
        table
    }

    /// The root type every other type descends from.
    pub fn root_type(&self) -> TypeId {
        TypeId(0)
    }

    /// Declare a new type under the given supertype.
    pub fn add_type(&self, name: NameId, parent: TypeId) -> TypeId {
        let mut types = self.types.write();
        let id = TypeId(types.len() as u32);
        types.push(TypeEntry {
            name,
            parent: Some(parent),
        });
        id
    }

    /// Declare a new object of the given type.
    pub fn add_object(&self, name: NameId, ty: TypeId) -> ObjectId {
        let mut objects = self.objects.write();
        let id = ObjectId(objects.len() as u32);
        objects.push(ObjectEntry { name, ty });
        id
    }

    /// Declare a named variable of the given type.
    pub fn add_named_variable(&self, name: NameId, ty: TypeId) -> VariableId {
        self.push_variable(Some(name), ty)
    }

    /// Mint a fresh anonymous variable of the given type.
    pub fn add_variable(&self, ty: TypeId) -> VariableId {
        self.push_variable(None, ty)
    }

    fn push_variable(&self, name: Option<NameId>, ty: TypeId) -> VariableId {
        let mut variables = self.variables.write();
        let id = VariableId(variables.len() as u32);
        variables.push(VariableEntry { name, ty });
        id
    }

    /// The declared type of an object.
    pub fn object_type(&self, object: ObjectId) -> TypeId {
        self.objects.read()[object.0 as usize].ty
    }

    /// The declared type of a variable.
    pub fn variable_type(&self, variable: VariableId) -> TypeId {
        self.variables.read()[variable.0 as usize].ty
    }

    /// Display name of an object.
    pub fn object_name(&self, object: ObjectId) -> NameId {
        self.objects.read()[object.0 as usize].name
    }

    /// Display name of a type.
    pub fn type_name(&self, ty: TypeId) -> NameId {
        self.types.read()[ty.0 as usize].name
    }

    /// Display name of a variable, if it has one.
    pub fn variable_name(&self, variable: VariableId) -> Option<NameId> {
        self.variables.read()[variable.0 as usize].name
    }

    /// Check whether `sub` is `sup` or a descendant of it.
    pub fn subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let types = self.types.read();
        let mut current = Some(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            current = types[ty.0 as usize].parent;
        }
        false
    }

    /// All objects whose type is compatible with `ty`, in declaration
    /// order.
    pub fn compatible_objects(&self, ty: TypeId) -> Vec<ObjectId> {
        let objects = self.objects.read();
        (0..objects.len() as u32)
            .map(ObjectId)
            .filter(|o| self.subtype(objects[o.0 as usize].ty, ty))
            .collect()
    }

    /// Number of declared objects.
    pub fn num_objects(&self) -> usize {
        self.objects.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolStore;

    fn setup() -> (SymbolStore, TermTable) {
        let symbols = SymbolStore::new();
        let root = symbols.intern("object");
        let table = TermTable::new(root);
        (symbols, table)
    }

    #[test]
    fn root_type_is_own_supertype() {
        let (_, table) = setup();
        let root = table.root_type();
        assert!(table.subtype(root, root));
    }

    #[test]
    fn subtype_follows_parent_links() {
        let (symbols, table) = setup();
        let vehicle = table.add_type(symbols.intern("vehicle"), table.root_type());
        let truck = table.add_type(symbols.intern("truck"), vehicle);
        assert!(table.subtype(truck, vehicle));
        assert!(table.subtype(truck, table.root_type()));
        assert!(!table.subtype(vehicle, truck));
    }

    #[test]
    fn compatible_objects_filters_by_type() {
        let (symbols, table) = setup();
        let vehicle = table.add_type(symbols.intern("vehicle"), table.root_type());
        let city = table.add_type(symbols.intern("city"), table.root_type());
        let t1 = table.add_object(symbols.intern("t1"), vehicle);
        let c1 = table.add_object(symbols.intern("c1"), city);
        assert_eq!(table.compatible_objects(vehicle), vec![t1]);
        assert_eq!(table.compatible_objects(city), vec![c1]);
        assert_eq!(table.compatible_objects(table.root_type()), vec![t1, c1]);
    }

    #[test]
    fn fresh_variables_are_distinct_and_typed() {
        let (_, table) = setup();
        let v1 = table.add_variable(table.root_type());
        let v2 = table.add_variable(table.root_type());
        assert_ne!(v1, v2);
        assert_eq!(table.variable_type(v1), table.root_type());
        assert_eq!(table.variable_name(v1), None);
    }
}
