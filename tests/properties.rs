use config_patcher::xml::XmlEditor;
use config_patcher::yaml::YamlEditor;
use config_patcher::{ConfigPatcher, ConfigValue, ElementSelector, KeyPath};
use proptest::prelude::*;
use std::collections::BTreeMap;

const DOCUMENTS: [&str; 5] = [
    "",
    "a: 1\n",
    "a:\n    b: x # note\n\nc: [1, 2]\n",
    "# header\nb:\n  - one\n  - two\nd: { e: 1 }\n",
    "a:\r\n  b:\r\n    c: true\r\n",
];

const XML_DOCUMENTS: [&str; 5] = [
    "",
    "<container/>\n",
    "<?xml version=\"1.0\"?>\n<container>\n    <services>\n        <service id=\"a\"/> <!-- first -->\n    </services>\n</container>\n",
    "<container><parameters><parameter key=\"k\">v</parameter></parameters></container>",
    "<container>\r\n  <services>\r\n  </services>\r\n</container>\r\n",
];

fn arb_document() -> impl Strategy<Value = &'static str> {
    prop::sample::select(DOCUMENTS.to_vec())
}

fn arb_path() -> impl Strategy<Value = KeyPath> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e", "paths"]), 1..4)
        .prop_map(|parts| KeyPath::new(parts).unwrap())
}

fn arb_selector() -> impl Strategy<Value = ElementSelector> {
    let step = prop_oneof![
        Just("services".to_string()),
        Just("parameters".to_string()),
        prop::sample::select(vec!["a", "b", "c"]).prop_map(|id| format!("service[@id='{id}']")),
    ];
    prop::collection::vec(step, 1..3).prop_map(|steps| {
        ElementSelector::parse(&format!("/container/{}", steps.join("/"))).unwrap()
    })
}

fn arb_attributes() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::sample::select(vec!["class", "public", "lazy"]).prop_map(str::to_string),
        "[a-zA-Z0-9\\\\&<\" ]{0,8}",
        0..3,
    )
}

fn arb_scalar() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        any::<i64>().prop_map(ConfigValue::Integer),
        any::<bool>().prop_map(ConfigValue::Bool),
        Just(ConfigValue::Null),
        "[a-zA-Z0-9_%./ -]{0,12}".prop_map(ConfigValue::String),
    ]
}

fn arb_value() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        3 => arb_scalar(),
        1 => prop::collection::vec(arb_scalar(), 0..3).prop_map(ConfigValue::Sequence),
        1 => prop::collection::vec(("[a-z]{1,4}", arb_scalar()), 1..3)
            .prop_map(|entries| {
                let mut seen = std::collections::HashSet::new();
                ConfigValue::Mapping(
                    entries
                        .into_iter()
                        .filter(|(key, _)| seen.insert(key.clone()))
                        .collect(),
                )
            }),
    ]
}

proptest! {
    #[test]
    fn set_is_idempotent(doc in arb_document(), path in arb_path(), value in arb_value()) {
        // shape conflicts are valid outcomes, not properties under test
        let Ok(first) = ConfigPatcher::set_mapping_value(doc, &path, &value) else {
            return Ok(());
        };
        let second = ConfigPatcher::set_mapping_value(&first.text, &path, &value).unwrap();
        prop_assert!(!second.changed());
        prop_assert_eq!(&second.text, &first.text);

        let editor = YamlEditor::parse(&first.text).unwrap();
        let stored = editor.get(&path).expect("value is present after set");
        prop_assert!(value.matches(stored), "{} != {:?}", value, stored);
    }

    #[test]
    fn append_is_idempotent(doc in arb_document(), path in arb_path(), item in arb_scalar()) {
        let Ok(first) = ConfigPatcher::append_to_list(doc, &path, &item) else {
            return Ok(());
        };
        let second = ConfigPatcher::append_to_list(&first.text, &path, &item).unwrap();
        prop_assert!(!second.changed());
        prop_assert_eq!(&second.text, &first.text);

        let editor = YamlEditor::parse(&first.text).unwrap();
        let list = editor
            .get(&path)
            .and_then(|value| value.as_sequence())
            .expect("list is present after append");
        prop_assert_eq!(list.iter().filter(|existing| item.matches(existing)).count(), 1);
    }

    #[test]
    fn unchanged_results_return_input_verbatim(doc in arb_document(), path in arb_path()) {
        if let Ok(result) = ConfigPatcher::set_if_absent(doc, &path, &ConfigValue::Null) {
            if !result.changed() {
                prop_assert_eq!(result.text, doc);
            }
        }
    }

    #[test]
    fn ensure_element_is_idempotent(
        doc in prop::sample::select(XML_DOCUMENTS.to_vec()),
        selector in arb_selector(),
        attributes in arb_attributes(),
    ) {
        // ambiguous selectors are valid outcomes, not properties under test
        let Ok(first) = ConfigPatcher::ensure_element(doc, &selector, &attributes) else {
            return Ok(());
        };
        let second = ConfigPatcher::ensure_element(&first.text, &selector, &attributes).unwrap();
        prop_assert!(!second.changed());
        prop_assert_eq!(&second.text, &first.text);

        let editor = XmlEditor::parse(&first.text).unwrap();
        let element = editor
            .find(&selector)
            .unwrap()
            .expect("element is present after ensure");
        for (name, value) in &attributes {
            let stored = element.attributes.iter().find(|attr| &attr.name == name);
            prop_assert_eq!(stored.map(|attr| attr.value.as_str()), Some(value.as_str()));
        }
    }
}
