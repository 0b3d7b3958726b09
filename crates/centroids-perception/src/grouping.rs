use std::collections::HashMap;

/// Stable partition by label: groups appear in the order their label was
/// first seen, and members keep their input order.
pub(crate) fn group_by_label<T, V>(
    items: impl IntoIterator<Item = T>,
    split: impl Fn(T) -> (u32, V),
) -> Vec<(u32, Vec<V>)> {
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut groups: Vec<(u32, Vec<V>)> = Vec::new();
    for item in items {
        let (label, value) = split(item);
        let slot = *slots.entry(label).or_insert_with(|| {
            groups.push((label, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(value);
    }
    groups
}
