//! Property-based tests for the composition state machine.
//!
//! Random key sequences are fed to an engine and structural invariants are
//! checked after every action.

use std::sync::Arc;

use proptest::prelude::*;

use libcin_core::{parse_cin_str, CinEngine, FstTable, Status, TableStore};

const TABLE: &str = "\
%selkey 12
%endkey '
%flag_disp_full_match
%keyname begin
a A
b B
c C
1 一
' '
%keyname end
%quick begin
ab 甲乙
%quick end
%chardef begin
a 日
a 曰
a 目
ab 明
abc 萌
b 月
c 金
c 全
a1 X
ca' 丙
%chardef end
";

const PREFIX_TABLE: &str = "\
%flag_disp_partial_match
%keyname begin
a A
b B
c C
%keyname end
%chardef begin
a 日
ab 明
abc 萌
ba 月
bb 朋
cab 金
abca 全
%chardef end
";

fn engine(cin: &str) -> CinEngine {
    CinEngine::new(Arc::new(
        FstTable::from_table(&parse_cin_str(cin)).unwrap(),
    ))
}

#[derive(Debug, Clone)]
enum Action {
    Type(char),
    Backspace,
    NextPage,
    PreviousPage,
    Reset,
    Toggle,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        40 => prop::sample::select(vec!['a', 'b', 'c']).prop_map(Action::Type),
        10 => prop::sample::select(vec!['1', '2', ' ', '\'', 'x', '!']).prop_map(Action::Type),
        8 => Just(Action::Backspace),
        4 => Just(Action::NextPage),
        4 => Just(Action::PreviousPage),
        2 => Just(Action::Reset),
        1 => Just(Action::Toggle),
    ]
}

fn execute(e: &mut CinEngine, action: &Action) {
    match action {
        Action::Type(k) => e.process_key(*k).unwrap(),
        Action::Backspace => {
            e.delete_backward().unwrap();
        }
        Action::NextPage => {
            e.next_page();
        }
        Action::PreviousPage => {
            e.previous_page();
        }
        Action::Reset => e.reset(),
        Action::Toggle => {
            let enabled = e.is_enabled();
            e.set_enabled(!enabled);
        }
    }
}

fn assert_invariants(e: &CinEngine, table: &FstTable, action: &Action) {
    let list = e.candidates();

    // 1. Selection needs a real choice
    if e.status() == Status::Selecting {
        assert!(
            list.len() > 1,
            "selecting with {} candidates after {:?}",
            list.len(),
            action
        );
        assert!(!e.keys().is_empty(), "selecting without keys after {:?}", action);
    }

    // 2. Page cursor bounds
    assert_eq!(
        list.current_page() == 0,
        list.is_empty(),
        "page {} with {} candidates after {:?}",
        list.current_page(),
        list.len(),
        action
    );
    assert!(list.current_page() <= list.num_pages());

    // 3. Only keynames accumulate
    for k in e.keys().chars() {
        assert!(
            table.keyname(k).is_some(),
            "non-keyname {:?} accumulated after {:?}",
            k,
            action
        );
    }

    // 4. No candidates without keys
    if e.keys().is_empty() {
        assert!(list.is_empty(), "candidates without keys after {:?}", action);
    }

    // 5. Disabled engines hold nothing
    if !e.is_enabled() {
        assert!(e.session().is_idle());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold(actions in prop::collection::vec(arb_action(), 0..48)) {
        let table = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        let mut e = engine(TABLE);
        for action in &actions {
            execute(&mut e, action);
            assert_invariants(&e, &table, action);
        }
    }

    #[test]
    fn backspace_matches_typing_prefix(keys in "[abc]{2,6}") {
        let mut typed = engine(PREFIX_TABLE);
        for k in keys.chars() {
            typed.process_key(k).unwrap();
        }
        typed.delete_backward().unwrap();

        let mut fresh = engine(PREFIX_TABLE);
        for k in keys.chars().take(keys.len() - 1) {
            fresh.process_key(k).unwrap();
        }
        prop_assert_eq!(typed.keys(), fresh.keys());
        prop_assert_eq!(typed.candidates(), fresh.candidates());
        prop_assert_eq!(typed.status(), fresh.status());
    }

    #[test]
    fn reset_always_idles(actions in prop::collection::vec(arb_action(), 0..24)) {
        let mut e = engine(TABLE);
        for action in &actions {
            execute(&mut e, action);
        }
        e.reset();
        prop_assert!(e.session().is_idle());
        prop_assert_eq!(e.candidates().current_page(), 0);
    }
}
