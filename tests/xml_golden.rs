use config_patcher::{ConfigPatcher, ElementSelector, PatchError, PatchInstruction};
use std::fs;

fn load_fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{name}"))
        .unwrap_or_else(|err| panic!("failed to load fixture {name}: {err}"))
}

fn ensure(selector: &str, attributes: &[(&str, &str)]) -> PatchInstruction {
    PatchInstruction::ensure_element(
        ElementSelector::parse(selector).expect("selector"),
        attributes.iter().copied(),
    )
}

fn phpunit_instructions() -> Vec<PatchInstruction> {
    vec![
        ensure("/phpunit/php/server[@name='APP_ENV']", &[("value", "test")]),
        ensure(
            "/phpunit/php/env[@name='KERNEL_CLASS']",
            &[("value", r"App\Kernel")],
        ),
        ensure(
            "/phpunit/php/server[@name='SHELL_VERBOSITY']",
            &[("value", "0")],
        ),
        ensure(
            r"/phpunit/extensions/bootstrap[@class='DAMA\DoctrineTestBundle\PHPUnit\PHPUnitExtension']",
            &[],
        ),
    ]
}

fn run(input: &str, instructions: &[PatchInstruction]) -> (String, Vec<bool>) {
    let mut text = input.to_string();
    let mut changed = Vec::new();
    for instruction in instructions {
        let patched = ConfigPatcher::apply(&text, instruction)
            .unwrap_or_else(|err| panic!("{instruction} failed: {err}"));
        changed.push(patched.changed());
        text = patched.text;
    }
    (text, changed)
}

#[test]
fn phpunit_fixture() {
    let input = load_fixture("phpunit.xml.dist.input");
    let expected = load_fixture("phpunit.xml.dist.expected");
    let instructions = phpunit_instructions();

    let (output, changed) = run(&input, &instructions);
    assert_eq!(output, expected);
    assert_eq!(changed, vec![false, true, true, true]);

    let (again, changed) = run(&output, &instructions);
    assert_eq!(again, output);
    assert!(changed.iter().all(|changed| !changed));
}

#[test]
fn prolog_and_comments_are_preserved() {
    let input = load_fixture("phpunit.xml.dist.input");
    let (output, _) = run(&input, &phpunit_instructions());
    let header = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\n<!-- https://docs.phpunit.de/en/10.5/configuration.html -->\n";
    assert!(output.starts_with(header));
}

#[test]
fn wrong_root_is_a_shape_conflict() {
    let input = load_fixture("phpunit.xml.dist.input");
    let err = ConfigPatcher::apply(&input, &ensure("/container/services", &[])).unwrap_err();
    assert!(err.is_shape_conflict());
}

#[test]
fn ambiguous_selector_is_rejected() {
    let input = load_fixture("phpunit.xml.dist.input");
    let err = ConfigPatcher::apply(&input, &ensure("/phpunit/php/ini", &[("value", "0")]))
        .unwrap_err();
    assert_eq!(
        err,
        PatchError::AmbiguousMatch {
            selector: "/phpunit/php/ini".to_string(),
            count: 2,
        }
    );
}

#[test]
fn malformed_documents_are_parse_errors() {
    let err = ConfigPatcher::apply("<phpunit><php></phpunit>", &ensure("/phpunit/php", &[]))
        .unwrap_err();
    assert!(err.is_parse_error());
}
