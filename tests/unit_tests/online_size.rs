use rbeim::online_size::OnlineSize;

#[test]
fn scalar_sizes_compare_against_numbers() {
    let mut n = OnlineSize::uniform(&["u"], 3);
    assert_eq!(n.total(), 3);
    assert!(n == 3);
    assert!(n < 4);
    n += 2;
    assert_eq!(n.get("u"), Some(5));
    assert!(n >= 5);
    assert_eq!(n.to_string(), "5");
}

#[test]
fn multi_component_sizes_compare_every_component() {
    let n = OnlineSize::from_components(&["u", "p"], &[("p", 2), ("u", 4)]);
    assert_eq!(n.iter().collect::<Vec<_>>(), vec![("u", 4), ("p", 2)]);
    assert_eq!(n.total(), 6);
    assert!(n <= 4);
    assert!(!(n < 4));
    assert!(n > 1);
    assert_eq!(n.partial_cmp(&3), None);
    assert_eq!(n.to_string(), "{u: 4, p: 2}");
}

#[test]
fn component_wise_minimum() {
    let n = OnlineSize::generate(&["u", "p"], |c| if c == "u" { 10 } else { 1 });
    let available = OnlineSize::uniform(&["u", "p"], 3);
    let expected = OnlineSize::from_components(&["u", "p"], &[("u", 3), ("p", 1)]);
    assert_eq!(n.min(&available), expected);
    assert_eq!(n.components().collect::<Vec<_>>(), vec!["u", "p"]);
}

#[test]
#[should_panic(expected = "Missing online size for component p")]
fn from_components_requires_every_component() {
    OnlineSize::from_components(&["u", "p"], &[("u", 1), ("q", 1)]);
}
