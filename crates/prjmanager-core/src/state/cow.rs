//! Copy-on-write helpers for `CowList`.
//!
//! 変更が無ければ None を返すので、呼び出し側は元の Arc をそのまま使い続けられます。

use crate::domain::CowList;
use std::sync::Arc;

pub(crate) enum Change<T> {
    Keep,
    Replace(T),
    Remove,
}

/// 各要素に `f` を適用し、変更があった場合だけ新しいリストを返す
pub(crate) fn update<T>(list: &CowList<T>, mut f: impl FnMut(&T) -> Change<T>) -> Option<CowList<T>> {
    let mut out: Option<Vec<Arc<T>>> = None;
    for (i, item) in list.iter().enumerate() {
        match f(item) {
            Change::Keep => {
                if let Some(out) = out.as_mut() {
                    out.push(item.clone());
                }
            }
            change => {
                let out = out.get_or_insert_with(|| list[..i].to_vec());
                if let Change::Replace(v) = change {
                    out.push(Arc::new(v));
                }
            }
        }
    }
    out.map(Arc::new)
}

/// `f` が true を返す要素を取り除く
pub(crate) fn remove_where<T>(list: &CowList<T>, mut f: impl FnMut(&T) -> bool) -> Option<CowList<T>> {
    update(list, |item| if f(item) { Change::Remove } else { Change::Keep })
}

/// 要素を追加し、key の昇順に並べ直す
pub(crate) fn append_sorted<T, K: Ord>(
    list: &CowList<T>,
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> CowList<T> {
    let mut out: Vec<Arc<T>> = list.iter().cloned().collect();
    out.extend(items.into_iter().map(Arc::new));
    out.sort_by(|a, b| key(a).cmp(&key(b)));
    Arc::new(out)
}
