mod common;

use vecstack_provisioner::manifest::{Edge, HostRef};
use vecstack_provisioner::{DependencyGraph, Desired, Manifest, ProvisionerError, ResourceKind};

use common::{PASSWORD, stack, stack_params};

fn deps_of<'a>(manifest: &'a Manifest, name: &str) -> Vec<&'a str> {
    let mut deps: Vec<&str> = manifest
        .edges
        .iter()
        .filter(|e| e.dependent == name)
        .map(|e| e.dependency.as_str())
        .collect();
    deps.sort_unstable();
    deps
}

#[test]
fn vector_stack_has_the_domain_edges() {
    let manifest = stack();

    assert_eq!(deps_of(&manifest, "vector-cluster"), Vec::<&str>::new());
    assert_eq!(deps_of(&manifest, "my-current-ip"), Vec::<&str>::new());
    assert_eq!(deps_of(&manifest, "vector-user"), ["vector-cluster"]);
    assert_eq!(
        deps_of(&manifest, "vector-collection"),
        ["my-current-ip", "vector-cluster", "vector-user"]
    );
    assert_eq!(deps_of(&manifest, "vector-index"), ["vector-collection"]);
}

#[test]
fn explicit_uri_drops_the_collection_to_cluster_edge() {
    let mut params = stack_params();
    params.cluster_uri = Some("mongodb+srv://vector-cluster.abcde.mongodb.net".into());
    let manifest = Manifest::vector_search(&params);

    assert_eq!(
        deps_of(&manifest, "vector-collection"),
        ["my-current-ip", "vector-user"]
    );
    let Desired::Collection(coll) = &manifest.specs[3].desired else {
        panic!("fourth spec should be the collection");
    };
    assert!(matches!(coll.connection.host, HostRef::Uri { .. }));
}

#[test]
fn topological_order_breaks_ties_by_manifest_order() {
    let graph = DependencyGraph::build(&stack()).unwrap();
    let order: Vec<&str> = graph
        .topological_order()
        .into_iter()
        .map(|i| graph.spec(i).name.as_str())
        .collect();
    assert_eq!(
        order,
        ["vector-cluster", "vector-user", "my-current-ip", "vector-collection", "vector-index"]
    );
}

#[test]
fn cycle_is_an_invalid_plan() {
    let mut manifest = stack();
    manifest.edges.push(Edge::new("vector-user", "vector-index"));

    match DependencyGraph::build(&manifest) {
        Err(ProvisionerError::InvalidPlan(msg)) => assert!(msg.contains("cycle"), "{msg}"),
        other => panic!("expected InvalidPlan, got {other:?}"),
    }
}

#[test]
fn duplicate_names_and_dangling_edges_are_rejected() {
    let mut duplicated = stack();
    let copy = duplicated.specs[0].clone();
    duplicated.specs.push(copy);
    assert!(matches!(
        DependencyGraph::build(&duplicated),
        Err(ProvisionerError::InvalidPlan(_))
    ));

    let mut dangling = stack();
    dangling.edges.push(Edge::new("vector-index", "no-such-node"));
    assert!(matches!(
        DependencyGraph::build(&dangling),
        Err(ProvisionerError::InvalidPlan(_))
    ));

    let mut self_edge = stack();
    self_edge.edges.push(Edge::new("vector-user", "vector-user"));
    assert!(matches!(
        DependencyGraph::build(&self_edge),
        Err(ProvisionerError::InvalidPlan(_))
    ));
}

#[test]
fn parsed_document_without_edges_derives_them() {
    let doc = br#"{
        "specs": [
            {
                "name": "vector-collection",
                "desired": {
                    "kind": "collection",
                    "connection": {
                        "host": { "type": "uri", "uri": "mongodb://localhost:27017" },
                        "username": "vector-user",
                        "password": "pw"
                    },
                    "database": "ww",
                    "collection": "facts"
                }
            },
            {
                "name": "vector-index",
                "desired": {
                    "kind": "search_index",
                    "connection": {
                        "host": { "type": "uri", "uri": "mongodb://localhost:27017" },
                        "username": "vector-user",
                        "password": "pw"
                    },
                    "database": "ww",
                    "collection": "facts",
                    "index_name": "vector-index",
                    "fields": [{
                        "path": "embedding",
                        "num_dimensions": 768,
                        "similarity": "dotProduct",
                        "quantization": "scalar"
                    }]
                }
            }
        ]
    }"#;

    let manifest = Manifest::from_json(doc).unwrap();
    assert_eq!(manifest.version, Manifest::VERSION);
    assert_eq!(manifest.specs[1].kind(), ResourceKind::SearchIndex);
    assert_eq!(manifest.edges, [Edge::new("vector-index", "vector-collection")]);
    DependencyGraph::build(&manifest).unwrap();
}

#[test]
fn parsed_document_keeps_explicit_edges() {
    let doc = br#"{
        "version": 1,
        "specs": [
            { "name": "a", "desired": { "kind": "access_entry", "project_id": "p", "ip_address": "10.0.0.1" } },
            { "name": "b", "desired": { "kind": "access_entry", "project_id": "p", "ip_address": "10.0.0.2" } }
        ],
        "edges": [{ "dependent": "a", "dependency": "b" }]
    }"#;

    let manifest = Manifest::from_json(doc).unwrap();
    assert_eq!(manifest.edges, [Edge::new("a", "b")]);
}

#[test]
fn serialized_manifest_redacts_passwords() {
    let json = serde_json::to_string(&stack()).unwrap();
    assert!(!json.contains(PASSWORD));
    assert!(json.contains("***"));
}

#[test]
fn specs_validate_kind_properties() {
    for spec in &stack().specs {
        spec.validate().unwrap();
    }

    let mut params = stack_params();
    params.vector_field.num_dimensions = 0;
    let manifest = Manifest::vector_search(&params);
    let index = manifest.specs.iter().find(|s| s.name == "vector-index").unwrap();
    assert!(matches!(
        index.validate(),
        Err(ProvisionerError::InvalidSpec { .. })
    ));

    let mut params = stack_params();
    params.ip_address = "not-an-ip".into();
    let manifest = Manifest::vector_search(&params);
    let entry = manifest.specs.iter().find(|s| s.name == "my-current-ip").unwrap();
    assert!(entry.validate().is_err());
}
