use cordyceps_avl::AvlMap;

fn main() {
    env_logger::init();

    let mut map = AvlMap::new();

    for key in 1..=7u32 {
        map.insert(key, key * 10);
        map.assert_invariants();
        println!("{:?}", map.iter().map(|(k, _)| *k).collect::<Vec<_>>());
    }
    println!("height after ascending inserts: {}", map.height());

    assert_eq!(map.insert(4, 400), Some(40));
    map.assert_invariants();

    for key in [4, 1, 7] {
        let value = map.remove(&key).unwrap();
        map.assert_invariants();
        println!("removed {key} => {value}: {map:?}");
    }

    match map.find(&4) {
        Ok(value) => println!("found {value}"),
        Err(e) => println!("4: {e}"),
    }

    let first = map.pop_first().unwrap();
    assert_eq!(first, (2, 20));
    map.assert_invariants();

    drop(map);
}
