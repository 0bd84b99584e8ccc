//! End-to-end resolution: wiring an aggregator from registered components,
//! translations and cataloged classes.

use std::sync::Arc;

use ctxmesh_core::component::{ComponentDescription, KindDescription, StaticSource};
use ctxmesh_core::{Aggregator, ComponentClass, ComponentHandle, Discoverer, Interpreter, Parameter, Role, Widget};
use ctxmesh_test_utils::config::{TestConfigBuilder, kind as kind_config};
use ctxmesh_test_utils::fixtures::FnTransform;
use ctxmesh_test_utils::mesh::{TestMesh, kind, kinds};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test_log::test]
fn resolves_widgets_and_binds_one_interpretation() {
    let mesh = TestMesh::new();
    let aggregator = mesh.aggregator();

    let w2 = mesh.w2.as_ref().unwrap();
    assert!(aggregator.is_attached(mesh.w1.id()));
    assert!(aggregator.is_attached(w2.id()));
    assert!(aggregator.unsatisfied().is_empty());

    let interpretations = aggregator.interpretations();
    assert_eq!(interpretations.len(), 1);
    assert_eq!(interpretations[0].interpreter_id, mesh.i1.id());
    assert_eq!(interpretations[0].input_kinds.len(), 2);
    assert!(interpretations[0].output_kinds.contains_kind_of(&mesh.kind("C")));
}

#[test_log::test]
fn missing_input_leaves_interpreter_unbound() {
    let mesh = TestMesh::without_b();
    let aggregator = mesh.aggregator();

    assert!(aggregator.interpretations().is_empty());
    assert!(!aggregator.is_attached(mesh.i1.id()));
    assert!(aggregator.unsatisfied().contains_kind_of(&mesh.kind("C")));
}

#[test_log::test(tokio::test)]
async fn input_parameter_matches_concrete_widget_output() {
    let d = Discoverer::new();
    let distance = |target: Parameter| {
        d.build_context_information("CI_DISTANCE", "FLOAT", vec![Parameter::new("CP_UNIT", "STRING", "KILOMETERS"), target])
    };
    let any_target = distance(Parameter::input("CP_TARGET", "STRING"));
    let to_berlin = distance(Parameter::new("CP_TARGET", "STRING", "Berlin"));
    let travel_time = d.build_context_information("CI_TRAVEL_TIME", "FLOAT", Vec::new());

    let router = Widget::new(
        &d,
        "Router",
        vec![to_berlin.clone()].into(),
        StaticSource::new(vec![to_berlin.clone().with_value(12.5)].into()),
    );
    let planner = Interpreter::new(
        &d,
        "Planner",
        vec![any_target].into(),
        vec![travel_time.clone()].into(),
        FnTransform::sum(),
    );
    let aggregator = Aggregator::new(&d, "agg", vec![travel_time.clone()].into(), None);

    assert!(aggregator.unsatisfied().is_empty());
    assert!(aggregator.is_attached(router.id()));
    let interpretations = aggregator.interpretations();
    assert_eq!(interpretations.len(), 1);
    assert_eq!(interpretations[0].interpreter_id, planner.id());

    aggregator.query_referenced_components().await.unwrap();
    let data = aggregator.current_data();
    assert_eq!(data.get_by_kind(&to_berlin).unwrap().value(), &json!(12.5));
    assert_eq!(data.get_by_kind(&travel_time).unwrap().value(), &json!(12.5));
}

#[test]
fn translation_lets_synonym_producer_satisfy() {
    let config = TestConfigBuilder::new()
        .translation(
            kind_config("CI_USER_LOCATION_LATITUDE", "INTEGER"),
            kind_config("latitude", "INTEGER"),
        )
        .build();
    let discoverer = Discoverer::from_config(&config);
    let gps = Widget::new(
        &discoverer,
        "Gps",
        kinds(&discoverer, &["latitude"]),
        StaticSource::default(),
    );

    let aggregator = ctxmesh_core::Aggregator::new(
        &discoverer,
        "agg",
        kinds(&discoverer, &["CI_USER_LOCATION_LATITUDE"]),
        None,
    );

    assert!(aggregator.is_attached(gps.id()));
    assert!(aggregator.unsatisfied().is_empty());
}

#[test]
fn cataloged_class_instantiated_when_objects_available() {
    ctxmesh_test_utils::tracing_setup::init_test_tracing_with("ctxmesh_core::discoverer=debug");
    let config = TestConfigBuilder::new().available_object("battery-api").build();
    let discoverer = Discoverer::from_config(&config);
    discoverer.register_component_class(ComponentClass::new(
        ComponentDescription::widget("Battery")
            .output(KindDescription::new("CI_BATTERY", "INTEGER"))
            .requires("battery-api"),
        |d, outputs| {
            Ok(ComponentHandle::Widget(Widget::new(
                d,
                "Battery",
                outputs,
                StaticSource::default(),
            )))
        },
    ));
    discoverer.register_component_class(ComponentClass::new(
        ComponentDescription::widget("Camera")
            .output(KindDescription::new("CI_PHOTO", "STRING"))
            .requires("camera-api"),
        |d, outputs| {
            Ok(ComponentHandle::Widget(Widget::new(d, "Camera", outputs, StaticSource::default())))
        },
    ));

    let desired = vec![
        kind(&discoverer, "CI_BATTERY"),
        discoverer.build_context_information("CI_PHOTO", "STRING", Vec::new()),
    ]
    .into();
    let aggregator = ctxmesh_core::Aggregator::new(&discoverer, "agg", desired, None);

    let widgets = discoverer.components(&[Role::Widget]);
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].name(), "Battery");
    let unsatisfied: Vec<String> = aggregator
        .unsatisfied()
        .iter()
        .map(|k| k.name().to_string())
        .collect();
    assert_eq!(unsatisfied, vec!["CI_PHOTO"]);
    // the gated class stays cataloged
    assert_eq!(discoverer.catalog_descriptions().len(), 1);
}

#[tokio::test]
async fn unregistered_interpreter_keeps_binding_but_is_skipped() {
    let mesh = TestMesh::new();
    let aggregator = mesh.aggregator();
    mesh.discoverer.unregister_component(mesh.i1.id());

    assert_eq!(aggregator.interpretations().len(), 1);
    let descriptions = mesh.discoverer.descriptions(&Role::ALL);
    assert!(descriptions.iter().all(|d| d.name != "I1"));

    aggregator
        .put_data(vec![mesh.kind("A").with_value(1), mesh.kind("B").with_value(2)].into())
        .await
        .unwrap();
    assert_eq!(mesh.i1_calls(), 0);
    assert!(!aggregator.current_data().contains_kind_of(&mesh.kind("C")));
}

#[test]
fn descriptions_serialize_with_roles() {
    let mesh = TestMesh::new();
    let _aggregator = mesh.aggregator();
    let descriptions = mesh.discoverer.descriptions(&Role::ALL);
    let json = serde_json::to_value(&descriptions).unwrap();

    assert_eq!(json[0]["role"], json!("widget"));
    assert_eq!(json[2]["role"], json!("interpreter"));
    assert_eq!(json[2]["in"].as_array().unwrap().len(), 2);
    assert_eq!(json[3]["role"], json!("aggregator"));
}

#[test]
fn discoverer_dropped_with_last_handle() {
    let discoverer = Discoverer::new();
    let weak = Arc::downgrade(&discoverer);
    Widget::new(
        &discoverer,
        "W",
        kinds(&discoverer, &["A"]),
        StaticSource::default(),
    );
    drop(discoverer);
    assert!(weak.upgrade().is_none());
}
