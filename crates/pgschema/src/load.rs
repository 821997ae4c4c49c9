//! Building a [`Database`] from a document.
//!
//! Loading runs in two passes. The first registers every object under its
//! schema with all references left unbound; the second binds each reference to
//! the object it names. Forward references are therefore fine: a table may
//! inherit from a table further down the document and a role may be a member
//! of a role declared after it.

use serde_json::Value;
use tracing::{debug, trace};

use crate::document::{
    ArgumentDoc, ColumnDoc, FORMAT_VERSION, ObjectDoc, PrimaryKeyDoc, TableNameDoc,
};
use crate::model::*;
use crate::refs::{ObjectId, ObjectRef, QualifiedName, RoleRef, TypeRef};
use crate::{Database, Error, ObjectKind, Options, Result};

impl Database {
    /// Load a document held as a JSON value.
    pub fn from_value(value: Value, options: Options) -> Result<Database> {
        let Value::Object(mut root) = value else {
            return Err(Error::malformed("document", "expected a mapping"));
        };

        let version = match root.remove("version") {
            None | Some(Value::Null) => FORMAT_VERSION.to_string(),
            Some(Value::String(s)) => s,
            // Only the string "1" names the format, never the number.
            Some(other) => {
                return Err(Error::UnsupportedVersion {
                    version: other.to_string(),
                });
            }
        };
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }

        let mut context = LoadContext::new(options);

        if let Some(extensions) = root.remove("extensions") {
            context.database.extensions = serde_json::from_value(extensions)?;
        }

        let entries = match root.remove("objects") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(Error::malformed("document", "`objects` must be a list")),
        };
        for entry in entries {
            let doc = parse_entry(entry)?;
            context.register(doc);
        }

        context.finish()
    }

    /// Load a document from JSON text.
    pub fn from_json(text: &str, options: Options) -> Result<Database> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value, options)
    }
}

/// Dispatch one `objects` entry on its single key.
fn parse_entry(entry: Value) -> Result<ObjectDoc> {
    let Value::Object(map) = entry else {
        return Err(Error::malformed("object", "expected a single-key mapping"));
    };
    if map.len() != 1 {
        return Err(Error::malformed(
            "object",
            format!("expected a single-key mapping, found {} keys", map.len()),
        ));
    }
    let Some(tag) = map.keys().next().cloned() else {
        return Err(Error::malformed("object", "empty mapping"));
    };
    let Some(kind) = ObjectKind::from_tag(&tag) else {
        return Err(Error::UnsupportedObjectKind { kind: tag });
    };

    serde_json::from_value(Value::Object(map)).map_err(|e| Error::malformed(kind.as_str(), e))
}

/// State of one load operation.
///
/// The database under construction doubles as the registry of everything
/// seen so far, roles included.
pub(crate) struct LoadContext {
    database: Database,
}

impl LoadContext {
    pub(crate) fn new(options: Options) -> Self {
        Self {
            database: Database::new(options),
        }
    }

    fn default_schema(&self) -> &str {
        &self.database.options.default_schema
    }

    fn schema_or_default(&self, schema: Option<String>) -> String {
        schema.unwrap_or_else(|| self.default_schema().to_string())
    }

    fn type_ref(&self, text: &str) -> TypeRef {
        TypeRef::parse(text, self.default_schema())
    }

    fn qualified(&self, text: &str) -> QualifiedName {
        QualifiedName::parse(text, self.default_schema())
    }

    fn table_ref(&self, doc: TableNameDoc) -> ObjectRef {
        ObjectRef::new(QualifiedName::new(self.schema_or_default(doc.schema), doc.name))
    }

    fn column(&self, doc: ColumnDoc) -> Column {
        Column {
            name: doc.name,
            data_type: self.type_ref(&doc.data_type),
            nullable: doc.nullable,
            default: doc.default,
            description: doc.description,
            identity: doc.identity,
        }
    }

    fn arguments(&self, docs: Vec<ArgumentDoc>) -> Vec<Argument> {
        docs.into_iter()
            .map(|doc| Argument {
                name: doc.name,
                data_type: self.type_ref(&doc.data_type),
                mode: doc.mode,
                default: doc.default,
            })
            .collect()
    }

    /// First pass: turn a document entry into an unbound object and register
    /// it.
    pub(crate) fn register(&mut self, doc: ObjectDoc) -> ObjectId {
        let object = match doc {
            ObjectDoc::Schema(s) => {
                return self.database.register_schema(&s.name, s.description, false);
            }
            ObjectDoc::Table(t) => {
                let schema = self.schema_or_default(t.schema);
                let foreign_keys = t
                    .foreign_keys
                    .into_iter()
                    .map(|fk| ForeignKey {
                        name: fk.name,
                        schema: schema.clone(),
                        columns: fk.columns,
                        references: self.table_ref(fk.references.table),
                        referenced_columns: fk.references.columns,
                        on_update: fk.on_update,
                        on_delete: fk.on_delete,
                    })
                    .collect();
                Object::Table(Table {
                    name: t.name,
                    columns: t.columns.into_iter().map(|c| self.column(c)).collect(),
                    primary_key: t.primary_key.map(|pk| match pk {
                        PrimaryKeyDoc::Columns(columns) => PrimaryKey {
                            name: None,
                            columns,
                        },
                        PrimaryKeyDoc::Named(pk) => pk,
                    }),
                    foreign_keys,
                    unique: t.unique,
                    check: t.check,
                    exclude: t.exclude,
                    inherits: t.inherits.map(|parent| self.table_ref(parent)),
                    description: t.description,
                    indexes: t.indexes,
                    schema,
                })
            }
            ObjectDoc::Function(f) => Object::Function(Function {
                schema: self.schema_or_default(f.schema),
                name: f.name,
                arguments: self.arguments(f.arguments),
                return_type: self.type_ref(&f.return_type),
                returns_set: f.returns_set,
                language: f.language,
                source: f.source,
                volatility: f.volatility,
                strict: f.strict,
                description: f.description,
            }),
            ObjectDoc::Procedure(p) => Object::Procedure(Procedure {
                schema: self.schema_or_default(p.schema),
                name: p.name,
                arguments: self.arguments(p.arguments),
                language: p.language,
                source: p.source,
                description: p.description,
            }),
            ObjectDoc::View(v) => Object::View(View {
                schema: self.schema_or_default(v.schema),
                name: v.name,
                query: v.query,
                description: v.description,
            }),
            ObjectDoc::CompositeType(c) => Object::CompositeType(CompositeType {
                schema: self.schema_or_default(c.schema),
                name: c.name,
                columns: c.columns.into_iter().map(|col| self.column(col)).collect(),
                description: c.description,
            }),
            ObjectDoc::EnumType(e) => Object::EnumType(EnumType {
                schema: self.schema_or_default(e.schema),
                name: e.name,
                labels: e.labels,
                description: e.description,
            }),
            ObjectDoc::Aggregate(a) => Object::Aggregate(Aggregate {
                schema: self.schema_or_default(a.schema),
                name: a.name,
                arguments: self.arguments(a.arguments),
                sfunc: ObjectRef::new(self.qualified(&a.sfunc)),
                stype: self.type_ref(&a.stype),
                final_func: a.final_func.map(|f| ObjectRef::new(self.qualified(&f))),
                initial_value: a.initial_value,
                description: a.description,
            }),
            ObjectDoc::Sequence(s) => Object::Sequence(Sequence {
                schema: self.schema_or_default(s.schema),
                name: s.name,
                start_value: s.startvalue,
                minimum_value: s.minimumvalue,
                maximum_value: s.maximumvalue,
                increment: s.increment,
                cycle: s.cycle,
            }),
            ObjectDoc::Role(r) => Object::Role(Role {
                name: r.name,
                superuser: r.superuser,
                inherit: r.inherit,
                createrole: r.createrole,
                createdb: r.createdb,
                login: r.login,
                member_of: r.member_of.into_iter().map(RoleRef::new).collect(),
            }),
            ObjectDoc::Trigger(t) => Object::Trigger(Trigger {
                name: t.name,
                function: ObjectRef::new(self.qualified(&t.function)),
                table: self.table_ref(t.table),
                timing: t.when,
                events: t.events,
                level: t.affecteach,
                condition: t.condition,
                arguments: t.arguments,
            }),
            ObjectDoc::Cast(c) => Object::Cast(Cast {
                source: self.type_ref(&c.source),
                target: self.type_ref(&c.target),
                function: c.function.map(|f| ObjectRef::new(self.qualified(&f))),
                implicit: c.implicit,
            }),
            ObjectDoc::Setting(s) => Object::Setting(Setting {
                name: s.name,
                value: s.value,
            }),
            ObjectDoc::Row(r) => Object::Row(Row {
                table: self.table_ref(r.table),
                values: r.values,
            }),
            ObjectDoc::Operator(o) => Object::Operator(Operator {
                schema: self.schema_or_default(o.schema),
                name: o.name,
                left_arg: o.left_arg.map(|t| self.type_ref(&t)),
                right_arg: o.right_arg.map(|t| self.type_ref(&t)),
                function: ObjectRef::new(self.qualified(&o.function)),
                commutator: o.commutator,
                negator: o.negator,
            }),
        };

        trace!(kind = %object.kind(), ident = %object.ident(), "registered");
        self.database.push(object)
    }

    /// Second pass: bind every reference, then compute dependencies.
    pub(crate) fn finish(self) -> Result<Database> {
        let mut database = self.database;
        debug!(objects = database.objects.len(), "binding references");

        let binder = Binder {
            database: &database,
        };
        let bound = database
            .objects
            .iter()
            .map(|object| binder.bind(object.clone()))
            .collect::<Result<Vec<_>>>()?;
        database.objects = bound;

        let dependencies = database
            .objects
            .iter()
            .map(|object| database.collect_dependencies(object))
            .collect();
        database.dependencies = dependencies;

        debug!(
            schemas = database.schemas.len(),
            objects = database.objects.len(),
            "database loaded"
        );
        Ok(database)
    }
}

/// Binds references against a fully registered database.
struct Binder<'a> {
    database: &'a Database,
}

impl Binder<'_> {
    fn bind_type(&self, type_ref: &mut TypeRef) -> Result<()> {
        type_ref.target = Some(self.database.resolve_type(type_ref)?);
        Ok(())
    }

    fn bind_columns(&self, columns: &mut [Column]) -> Result<()> {
        for column in columns {
            self.bind_type(&mut column.data_type)?;
        }
        Ok(())
    }

    fn bind_arguments(&self, arguments: &mut [Argument]) -> Result<()> {
        for argument in arguments {
            self.bind_type(&mut argument.data_type)?;
        }
        Ok(())
    }

    fn bind_table(&self, table: &mut ObjectRef) -> Result<()> {
        let name = &table.name;
        match self.database.find(ObjectKind::Table, &name.schema, &name.name) {
            Some(id) => {
                table.target = Some(id);
                Ok(())
            }
            None => Err(Error::ObjectNotFound {
                kind: ObjectKind::Table,
                schema: name.schema.clone(),
                name: name.name.clone(),
            }),
        }
    }

    /// Functions in silent schemas are usually built-ins and may stay unbound.
    fn bind_function(&self, function: &mut ObjectRef, arity: Option<usize>) -> Result<()> {
        if let Some(id) = self.database.find_function(&function.name, arity) {
            function.target = Some(id);
            return Ok(());
        }
        if self.database.options.is_silent(&function.name.schema) {
            trace!(function = %function.name, "leaving built-in function unbound");
            return Ok(());
        }
        Err(Error::ObjectNotFound {
            kind: ObjectKind::Function,
            schema: function.name.schema.clone(),
            name: function.name.name.clone(),
        })
    }

    fn bind_role(&self, role: &mut RoleRef) -> Result<()> {
        match self.database.role(&role.name) {
            Some(id) => {
                role.target = Some(id);
                Ok(())
            }
            None => Err(Error::RoleNotFound {
                name: role.name.clone(),
            }),
        }
    }

    fn bind(&self, mut object: Object) -> Result<Object> {
        match &mut object {
            Object::Schema(_) | Object::View(_) | Object::EnumType(_) => {}
            Object::Sequence(_) | Object::Setting(_) => {}
            Object::Table(t) => {
                self.bind_columns(&mut t.columns)?;
                for fk in &mut t.foreign_keys {
                    self.bind_table(&mut fk.references)?;
                }
                if let Some(parent) = &mut t.inherits {
                    self.bind_table(parent)?;
                }
            }
            Object::Function(f) => {
                self.bind_arguments(&mut f.arguments)?;
                self.bind_type(&mut f.return_type)?;
            }
            Object::Procedure(p) => self.bind_arguments(&mut p.arguments)?,
            Object::CompositeType(c) => self.bind_columns(&mut c.columns)?,
            Object::Aggregate(a) => {
                let arity = a.arity();
                self.bind_arguments(&mut a.arguments)?;
                self.bind_type(&mut a.stype)?;
                self.bind_function(&mut a.sfunc, Some(arity + 1))?;
                if let Some(final_func) = &mut a.final_func {
                    self.bind_function(final_func, Some(1))?;
                }
            }
            Object::Role(r) => {
                for membership in &mut r.member_of {
                    self.bind_role(membership)?;
                }
            }
            Object::Trigger(t) => {
                self.bind_table(&mut t.table)?;
                self.bind_function(&mut t.function, Some(0))?;
            }
            Object::Cast(c) => {
                self.bind_type(&mut c.source)?;
                self.bind_type(&mut c.target)?;
                if let Some(function) = &mut c.function {
                    self.bind_function(function, Some(1))?;
                }
            }
            Object::Row(r) => self.bind_table(&mut r.table)?,
            Object::Operator(o) => {
                let mut arity = 0;
                for operand in [&mut o.left_arg, &mut o.right_arg].into_iter().flatten() {
                    self.bind_type(operand)?;
                    arity += 1;
                }
                self.bind_function(&mut o.function, Some(arity))?;
            }
        }
        Ok(object)
    }
}
