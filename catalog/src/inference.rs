//! Foreign-key constraints → canonical relations, and the derived
//! many-to-many view over them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::inspector::{NameFolding, RawCatalog, RawForeignKey};
use crate::model::{
    DiscoveredColumn, DiscoveredRelation, DiscoveredTable, ReferentialAction, RelationType,
};
use crate::normalizer::CATALOG_NS;

// ---------- warnings ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    DuplicateTable,
    DuplicateColumn,
    /// FK target table or column is not in the catalog.
    UnresolvedReference,
    /// FK source and target column lists differ in length.
    ArityMismatch,
    /// A column already claimed by another FK constraint.
    DuplicateForeignKey,
}

/// A non-fatal defect found while building the catalog. The offending item is
/// left out; the run still succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub table_name: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, table_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            table_name: table_name.into(),
            message: message.into(),
        }
    }
}

// ---------- inference ----------

#[derive(Debug, Clone, Default)]
pub struct Inference {
    pub relations: Vec<DiscoveredRelation>,
    pub warnings: Vec<Warning>,
}

pub fn relation_id(source_column_id: Uuid, constraint_name: &str) -> Uuid {
    let key = format!("{source_column_id}:{constraint_name}");
    Uuid::new_v5(&CATALOG_NS, key.as_bytes())
}

/// Table and column lookup that follows the engine's identifier rules.
/// Matches always land on the catalog's own spelling.
struct Names<'t> {
    tables: &'t [DiscoveredTable],
    by_name: HashMap<String, usize>,
    folding: NameFolding,
}

impl<'t> Names<'t> {
    fn new(tables: &'t [DiscoveredTable], folding: NameFolding) -> Self {
        let mut by_name = HashMap::with_capacity(tables.len());
        for (i, t) in tables.iter().enumerate() {
            // First spelling wins when folding makes two names collide.
            by_name.entry(fold(&t.table_name, folding.tables)).or_insert(i);
        }
        Self {
            tables,
            by_name,
            folding,
        }
    }

    fn table(&self, name: &str) -> Option<usize> {
        self.by_name.get(&fold(name, self.folding.tables)).copied()
    }

    fn column(&self, table_idx: usize, name: &str) -> Option<&'t DiscoveredColumn> {
        let table = &self.tables[table_idx];
        table.column(name).or_else(|| {
            self.folding
                .columns
                .then(|| table.columns.iter().find(|c| c.column_name.eq_ignore_ascii_case(name)))
                .flatten()
        })
    }

    /// Column ids of a key, or `None` if any part is not in the catalog.
    fn key(&self, table_name: &str, columns: &[String]) -> Option<(usize, HashSet<Uuid>)> {
        let idx = self.table(table_name)?;
        let ids = columns
            .iter()
            .map(|c| self.column(idx, c).map(|col| col.id))
            .collect::<Option<HashSet<Uuid>>>()?;
        Some((idx, ids))
    }
}

/// SQLite and MySQL fold ASCII letters only.
fn fold(name: &str, enabled: bool) -> String {
    if enabled {
        name.to_ascii_lowercase()
    } else {
        name.to_string()
    }
}

/// Derive one relation per FK column pair.
///
/// Constraints are visited in (table, constraint name) order. A constraint that
/// cannot be resolved, or that reuses a column an earlier constraint already
/// claimed, is dropped whole, so the relations sharing a constraint name always
/// describe exactly one physical constraint. Afterwards every column's FK flag
/// and target names are reset to match the relations it is the source of.
pub fn infer(tables: &mut [DiscoveredTable], raw: &RawCatalog) -> Inference {
    let mut warnings = Vec::new();
    let mut relations = Vec::new();
    let mut targets: HashMap<Uuid, (String, String)> = HashMap::new();

    {
        let names = Names::new(tables, raw.folding);

        let mut unique_sets: HashMap<usize, Vec<HashSet<Uuid>>> = HashMap::new();
        for key in raw.primary_keys.iter().chain(raw.unique_keys.iter()) {
            if key.columns.is_empty() {
                continue;
            }
            if let Some((idx, ids)) = names.key(&key.table_name, &key.columns) {
                unique_sets.entry(idx).or_default().push(ids);
            }
        }

        let mut ordered: Vec<&RawForeignKey> = raw.foreign_keys.iter().collect();
        ordered.sort_by(|a, b| {
            (a.table_name.as_str(), a.constraint_name.as_str())
                .cmp(&(b.table_name.as_str(), b.constraint_name.as_str()))
        });

        for fk in ordered {
            let Some(pairs) = resolve(fk, &names, &raw.namespace, &mut warnings) else {
                continue;
            };

            let fk_columns: HashSet<Uuid> = pairs.iter().map(|(s, _)| s.id).collect();
            let taken = pairs
                .iter()
                .find(|(s, _)| targets.contains_key(&s.id))
                .map(|(s, _)| s.column_name);
            if taken.is_some() || fk_columns.len() != pairs.len() {
                let column = taken.unwrap_or("a column");
                warnings.push(Warning::new(
                    WarningKind::DuplicateForeignKey,
                    fk.table_name.as_str(),
                    format!(
                        "constraint {} on {} dropped: {column} is already the source of another foreign key",
                        fk.constraint_name, fk.table_name
                    ),
                ));
                continue;
            }

            let source_idx = pairs[0].0.table_idx;
            let target_idx = pairs[0].1.table_idx;
            let source_unique = unique_sets
                .get(&source_idx)
                .is_some_and(|sets| sets.iter().any(|k| k.is_subset(&fk_columns)));
            let relation_type = if source_unique {
                RelationType::OneToOne
            } else {
                RelationType::ManyToOne
            };

            let source_table = &names.tables[source_idx];
            let target_table = &names.tables[target_idx];
            for (source, target) in pairs {
                targets.insert(
                    source.id,
                    (target_table.table_name.clone(), target.column_name.to_string()),
                );
                relations.push(DiscoveredRelation {
                    id: relation_id(source.id, &fk.constraint_name),
                    connection_id: source_table.connection_id,
                    source_table_id: source_table.id,
                    target_table_id: target_table.id,
                    source_column_id: source.id,
                    target_column_id: target.id,
                    relation_type,
                    constraint_name: fk.constraint_name.clone(),
                    on_delete: ReferentialAction::parse(&fk.on_delete),
                    on_update: ReferentialAction::parse(&fk.on_update),
                });
            }
        }
    }

    for table in tables.iter_mut() {
        for column in table.columns.iter_mut() {
            let target = targets.remove(&column.id);
            column.is_foreign_key = target.is_some();
            (column.foreign_key_table, column.foreign_key_column) = target.unzip();
        }
    }

    for w in &warnings {
        tracing::warn!(kind = ?w.kind, table = %w.table_name, "{}", w.message);
    }

    Inference {
        relations,
        warnings,
    }
}

struct Endpoint<'t> {
    table_idx: usize,
    id: Uuid,
    column_name: &'t str,
}

/// Resolve every column pair of a constraint, or push a warning and give up.
fn resolve<'t>(
    fk: &RawForeignKey,
    names: &Names<'t>,
    namespace: &str,
    warnings: &mut Vec<Warning>,
) -> Option<Vec<(Endpoint<'t>, Endpoint<'t>)>> {
    let mut unresolved = |kind: WarningKind, detail: String| {
        warnings.push(Warning::new(
            kind,
            fk.table_name.as_str(),
            format!("constraint {} on {} dropped: {detail}", fk.constraint_name, fk.table_name),
        ));
        None
    };

    if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
        return unresolved(
            WarningKind::ArityMismatch,
            format!(
                "{} source column(s) against {} referenced column(s)",
                fk.columns.len(),
                fk.referenced_columns.len()
            ),
        );
    }

    if let Some(schema) = fk.referenced_schema.as_deref()
        && fold(schema, names.folding.tables) != fold(namespace, names.folding.tables)
    {
        return unresolved(
            WarningKind::UnresolvedReference,
            format!("target {schema}.{} is outside namespace {namespace}", fk.referenced_table),
        );
    }

    let Some(source_idx) = names.table(&fk.table_name) else {
        return unresolved(
            WarningKind::UnresolvedReference,
            format!("table {} not found", fk.table_name),
        );
    };
    let Some(target_idx) = names.table(&fk.referenced_table) else {
        return unresolved(
            WarningKind::UnresolvedReference,
            format!("referenced table {} not found", fk.referenced_table),
        );
    };

    let mut pairs = Vec::with_capacity(fk.columns.len());
    for (src, tgt) in fk.columns.iter().zip(fk.referenced_columns.iter()) {
        let Some(source) = names.column(source_idx, src) else {
            return unresolved(
                WarningKind::UnresolvedReference,
                format!("column {}.{src} not found", fk.table_name),
            );
        };
        let Some(target) = names.column(target_idx, tgt) else {
            return unresolved(
                WarningKind::UnresolvedReference,
                format!("referenced column {}.{tgt} not found", fk.referenced_table),
            );
        };
        pairs.push((
            Endpoint {
                table_idx: source_idx,
                id: source.id,
                column_name: &source.column_name,
            },
            Endpoint {
                table_idx: target_idx,
                id: target.id,
                column_name: &target.column_name,
            },
        ));
    }
    Some(pairs)
}

// ---------- derived view ----------

/// A table that exists to link two or more others: its primary key has at
/// least two columns, every one of them is an FK source, and together they
/// reference at least two distinct tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Junction {
    pub table_id: Uuid,
    pub table_name: String,
    /// The junction's outgoing relations, one per linked table.
    pub links: Vec<DiscoveredRelation>,
}

pub fn junctions(tables: &[DiscoveredTable], relations: &[DiscoveredRelation]) -> Vec<Junction> {
    let by_source: HashMap<Uuid, &DiscoveredRelation> =
        relations.iter().map(|r| (r.source_column_id, r)).collect();

    let mut out = Vec::new();
    for table in tables {
        let pk: Vec<&DiscoveredColumn> = table.primary_key().collect();
        if pk.len() < 2 {
            continue;
        }
        let Some(pk_relations) = pk
            .iter()
            .map(|c| by_source.get(&c.id).copied())
            .collect::<Option<Vec<&DiscoveredRelation>>>()
        else {
            continue;
        };

        // First relation per linked table, in PK order.
        let mut links: BTreeMap<usize, DiscoveredRelation> = BTreeMap::new();
        let mut seen_targets = HashSet::new();
        for (pos, rel) in pk_relations.into_iter().enumerate() {
            if seen_targets.insert(rel.target_table_id) {
                links.insert(pos, rel.clone());
            }
        }
        if links.len() < 2 {
            continue;
        }

        out.push(Junction {
            table_id: table.id,
            table_name: table.table_name.clone(),
            links: links.into_values().collect(),
        });
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    /// A persisted relation as stored.
    Stored,
    /// A persisted relation seen from the referenced table.
    Inverse,
    /// Many-to-many link through a junction table.
    Junction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationEdge {
    pub origin: EdgeOrigin,
    /// The stored relation this edge comes from; `None` for junction links.
    pub relation_id: Option<Uuid>,
    pub source_table_id: Uuid,
    pub target_table_id: Uuid,
    pub source_column_id: Uuid,
    pub target_column_id: Uuid,
    pub relation_type: RelationType,
    pub constraint_name: String,
    pub via_table_id: Option<Uuid>,
}

/// Every way to walk between tables of one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationView {
    pub edges: Vec<RelationEdge>,
    pub junctions: Vec<Junction>,
}

impl RelationView {
    pub fn build(tables: &[DiscoveredTable], relations: &[DiscoveredRelation]) -> Self {
        let mut edges = Vec::with_capacity(relations.len() * 2);

        for rel in relations {
            edges.push(RelationEdge {
                origin: EdgeOrigin::Stored,
                relation_id: Some(rel.id),
                source_table_id: rel.source_table_id,
                target_table_id: rel.target_table_id,
                source_column_id: rel.source_column_id,
                target_column_id: rel.target_column_id,
                relation_type: rel.relation_type,
                constraint_name: rel.constraint_name.clone(),
                via_table_id: None,
            });
            edges.push(RelationEdge {
                origin: EdgeOrigin::Inverse,
                relation_id: Some(rel.id),
                source_table_id: rel.target_table_id,
                target_table_id: rel.source_table_id,
                source_column_id: rel.target_column_id,
                target_column_id: rel.source_column_id,
                relation_type: rel.relation_type.inverse(),
                constraint_name: rel.constraint_name.clone(),
                via_table_id: None,
            });
        }

        let junctions = junctions(tables, relations);
        for junction in &junctions {
            for a in &junction.links {
                for b in &junction.links {
                    if a.target_table_id == b.target_table_id {
                        continue;
                    }
                    edges.push(RelationEdge {
                        origin: EdgeOrigin::Junction,
                        relation_id: None,
                        source_table_id: a.target_table_id,
                        target_table_id: b.target_table_id,
                        source_column_id: a.target_column_id,
                        target_column_id: b.target_column_id,
                        relation_type: RelationType::ManyToMany,
                        constraint_name: b.constraint_name.clone(),
                        via_table_id: Some(junction.table_id),
                    });
                }
            }
        }

        RelationView { edges, junctions }
    }

    pub fn many_to_many(&self) -> impl Iterator<Item = &RelationEdge> {
        self.edges
            .iter()
            .filter(|e| e.relation_type == RelationType::ManyToMany)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::{RawColumn, RawKey, RawTable};
    use crate::model::Dialect;
    use crate::normalizer::normalize;

    struct Fixture {
        raw: RawCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            Self::dialect(Dialect::Postgres, "public")
        }

        fn dialect(dialect: Dialect, namespace: &str) -> Self {
            Self {
                raw: RawCatalog::empty(dialect, namespace),
            }
        }

        fn table(mut self, name: &str, columns: &[&str], pk: &[&str]) -> Self {
            self.raw.tables.push(RawTable {
                table_name: name.to_string(),
                table_type: "BASE TABLE".to_string(),
                comment: None,
            });
            for (i, c) in columns.iter().enumerate() {
                self.raw.columns.push(RawColumn {
                    table_name: name.to_string(),
                    column_name: c.to_string(),
                    ordinal_position: Some(i as i32 + 1),
                    data_type: "integer".to_string(),
                    is_nullable: false,
                    column_default: None,
                    max_length: None,
                    precision: None,
                    scale: None,
                });
            }
            if !pk.is_empty() {
                self.raw.primary_keys.push(RawKey {
                    table_name: name.to_string(),
                    constraint_name: format!("{name}_pkey"),
                    columns: pk.iter().map(|c| c.to_string()).collect(),
                });
            }
            self
        }

        fn unique(mut self, table: &str, columns: &[&str]) -> Self {
            self.raw.unique_keys.push(RawKey {
                table_name: table.to_string(),
                constraint_name: format!("{table}_{}_key", columns.join("_")),
                columns: columns.iter().map(|c| c.to_string()).collect(),
            });
            self
        }

        fn fk(mut self, table: &str, name: &str, cols: &[&str], target: &str, target_cols: &[&str]) -> Self {
            self.raw.foreign_keys.push(RawForeignKey {
                table_name: table.to_string(),
                constraint_name: name.to_string(),
                columns: cols.iter().map(|c| c.to_string()).collect(),
                referenced_schema: None,
                referenced_table: target.to_string(),
                referenced_columns: target_cols.iter().map(|c| c.to_string()).collect(),
                on_delete: "CASCADE".to_string(),
                on_update: "NO ACTION".to_string(),
            });
            self
        }

        fn run(&self) -> (Vec<DiscoveredTable>, Inference) {
            let mut tables = normalize(Uuid::nil(), &self.raw).tables;
            let inference = infer(&mut tables, &self.raw);
            (tables, inference)
        }
    }

    fn blog() -> Fixture {
        Fixture::new()
            .table("users", &["id", "email"], &["id"])
            .table("posts", &["id", "user_id"], &["id"])
            .table("profiles", &["id", "user_id"], &["id"])
            .unique("profiles", &["user_id"])
            .fk("posts", "posts_user_id_fkey", &["user_id"], "users", &["id"])
            .fk("profiles", "profiles_user_id_fkey", &["user_id"], "users", &["id"])
    }

    fn table<'a>(tables: &'a [DiscoveredTable], name: &str) -> &'a DiscoveredTable {
        tables.iter().find(|t| t.table_name == name).unwrap()
    }

    #[test]
    fn test_cardinality_from_uniqueness() {
        let (tables, inference) = blog().run();
        assert!(inference.warnings.is_empty());
        assert_eq!(inference.relations.len(), 2);

        let posts = table(&tables, "posts");
        let profiles = table(&tables, "profiles");
        let users = table(&tables, "users");

        let post_rel = inference
            .relations
            .iter()
            .find(|r| r.source_table_id == posts.id)
            .unwrap();
        assert_eq!(post_rel.relation_type, RelationType::ManyToOne);
        assert_eq!(post_rel.target_table_id, users.id);
        assert_eq!(post_rel.target_column_id, users.column("id").unwrap().id);
        assert_eq!(post_rel.on_delete, ReferentialAction::Cascade);

        let profile_rel = inference
            .relations
            .iter()
            .find(|r| r.source_table_id == profiles.id)
            .unwrap();
        assert_eq!(profile_rel.relation_type, RelationType::OneToOne);
    }

    #[test]
    fn test_fk_flag_matches_relations() {
        let (tables, inference) = blog()
            .fk("posts", "posts_ghost_fkey", &["id"], "ghosts", &["id"])
            .run();

        let sources: HashSet<Uuid> = inference.relations.iter().map(|r| r.source_column_id).collect();
        for column in tables.iter().flat_map(|t| t.columns.iter()) {
            assert_eq!(column.is_foreign_key, sources.contains(&column.id), "{}", column.column_name);
        }
        // posts.id was eagerly flagged by the normalizer, then cleared.
        assert!(!table(&tables, "posts").column("id").unwrap().is_foreign_key);
    }

    #[test]
    fn test_unresolvable_references_dropped_with_warning() {
        let (_, inference) = Fixture::new()
            .table("a", &["id", "b_id", "c_id"], &["id"])
            .table("b", &["id"], &["id"])
            .fk("a", "a_missing_table", &["c_id"], "c", &["id"])
            .fk("a", "a_missing_column", &["b_id"], "b", &["nope"])
            .fk("a", "a_arity", &["b_id", "c_id"], "b", &["id"])
            .run();

        assert!(inference.relations.is_empty());
        let kinds: Vec<WarningKind> = inference.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::ArityMismatch,
                WarningKind::UnresolvedReference,
                WarningKind::UnresolvedReference
            ]
        );
    }

    #[test]
    fn test_composite_fk_decomposed_and_one_to_one_on_covering_pk() {
        let (_, inference) = Fixture::new()
            .table("orders", &["id", "rev"], &["id", "rev"])
            .table("invoices", &["order_id", "order_rev"], &["order_id", "order_rev"])
            .fk("invoices", "invoices_order_fkey", &["order_id", "order_rev"], "orders", &["id", "rev"])
            .run();

        assert_eq!(inference.relations.len(), 2);
        assert!(inference
            .relations
            .iter()
            .all(|r| r.constraint_name == "invoices_order_fkey"
                && r.relation_type == RelationType::OneToOne));
    }

    #[test]
    fn test_second_constraint_on_column_dropped() {
        let (_, inference) = Fixture::new()
            .table("a", &["id"], &["id"])
            .table("b", &["id"], &["id"])
            .table("c", &["id", "ref_id"], &["id"])
            .fk("c", "c_ref_b", &["ref_id"], "b", &["id"])
            .fk("c", "c_ref_a", &["ref_id"], "a", &["id"])
            .run();

        assert_eq!(inference.relations.len(), 1);
        assert_eq!(inference.relations[0].constraint_name, "c_ref_a");
        assert_eq!(inference.warnings[0].kind, WarningKind::DuplicateForeignKey);
    }

    #[test]
    fn test_composite_fk_overlapping_claimed_column_dropped_whole() {
        let (tables, inference) = Fixture::new()
            .table("a", &["id"], &["id"])
            .table("b", &["id", "k"], &["id", "k"])
            .table("c", &["x", "y"], &[])
            .fk("c", "c_a", &["x"], "a", &["id"])
            .fk("c", "c_b", &["x", "y"], "b", &["id", "k"])
            .run();

        let names: Vec<&str> = inference.relations.iter().map(|r| r.constraint_name.as_str()).collect();
        assert_eq!(names, vec!["c_a"]);
        assert_eq!(inference.warnings.len(), 1);
        assert_eq!(inference.warnings[0].kind, WarningKind::DuplicateForeignKey);
        assert!(inference.warnings[0].message.contains("c_b"));

        let c = table(&tables, "c");
        assert!(c.column("x").unwrap().is_foreign_key);
        assert!(!c.column("y").unwrap().is_foreign_key);
    }

    #[test]
    fn test_sqlite_references_match_case_insensitively() {
        let (tables, inference) = Fixture::dialect(Dialect::Sqlite, "main")
            .table("customers", &["id", "name"], &["id"])
            .table("orders", &["id", "customer_id"], &["id"])
            .fk("orders", "fk_orders_0", &["customer_id"], "Customers", &["ID"])
            .run();

        assert!(inference.warnings.is_empty(), "{:?}", inference.warnings);
        assert_eq!(inference.relations.len(), 1);
        let customers = table(&tables, "customers");
        assert_eq!(inference.relations[0].target_table_id, customers.id);
        assert_eq!(inference.relations[0].target_column_id, customers.column("id").unwrap().id);

        // Names are stored in the catalog's spelling.
        let customer_id = table(&tables, "orders").column("customer_id").unwrap();
        assert_eq!(customer_id.foreign_key_table.as_deref(), Some("customers"));
        assert_eq!(customer_id.foreign_key_column.as_deref(), Some("id"));
    }

    #[test]
    fn test_postgres_references_stay_case_sensitive() {
        let (_, inference) = Fixture::new()
            .table("customers", &["id"], &["id"])
            .table("orders", &["id", "customer_id"], &["id"])
            .fk("orders", "orders_customer_fkey", &["customer_id"], "Customers", &["id"])
            .run();

        assert!(inference.relations.is_empty());
        assert_eq!(inference.warnings[0].kind, WarningKind::UnresolvedReference);
    }

    #[test]
    fn test_mysql_table_folding_follows_server_setting() {
        let fixture = Fixture::dialect(Dialect::MySql, "shop")
            .table("customers", &["id"], &["id"])
            .table("orders", &["id", "customer_id"], &["id"])
            .fk("orders", "orders_ibfk_1", &["customer_id"], "Customers", &["ID"]);
        assert!(fixture.run().1.relations.is_empty());

        let mut folded = fixture;
        folded.raw.folding.tables = true;
        assert_eq!(folded.run().1.relations.len(), 1);
    }

    #[test]
    fn test_junction_detection_and_view() {
        let (tables, inference) = blog()
            .table("tags", &["id"], &["id"])
            .table("post_tags", &["post_id", "tag_id"], &["post_id", "tag_id"])
            .fk("post_tags", "post_tags_post_fkey", &["post_id"], "posts", &["id"])
            .fk("post_tags", "post_tags_tag_fkey", &["tag_id"], "tags", &["id"])
            .run();

        let found = junctions(&tables, &inference.relations);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].table_name, "post_tags");

        let view = RelationView::build(&tables, &inference.relations);
        let posts = table(&tables, "posts").id;
        let tags = table(&tables, "tags").id;
        let m2m: Vec<(Uuid, Uuid)> = view
            .many_to_many()
            .map(|e| (e.source_table_id, e.target_table_id))
            .collect();
        assert_eq!(m2m, vec![(posts, tags), (tags, posts)]);

        let users = table(&tables, "users").id;
        assert!(view.edges.iter().any(|e| e.origin == EdgeOrigin::Inverse
            && e.source_table_id == users
            && e.target_table_id == posts
            && e.relation_type == RelationType::OneToMany));
    }

    #[test]
    fn test_composite_pk_without_two_targets_is_not_junction() {
        let (tables, inference) = Fixture::new()
            .table("users", &["id"], &["id"])
            .table("follows", &["follower_id", "followee_id"], &["follower_id", "followee_id"])
            .fk("follows", "follows_follower_fkey", &["follower_id"], "users", &["id"])
            .fk("follows", "follows_followee_fkey", &["followee_id"], "users", &["id"])
            .run();

        assert!(junctions(&tables, &inference.relations).is_empty());
    }

    #[test]
    fn test_infer_is_deterministic() {
        let (tables_a, a) = blog().run();
        let (tables_b, b) = blog().run();
        assert_eq!(tables_a, tables_b);
        assert_eq!(a.relations, b.relations);
    }
}
