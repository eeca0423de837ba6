use crate::types::{Mirror, Status};

/// 过滤模式: 按最低状态过滤, 或只看延迟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    MinStatus(Status),
    PingOnly,
}

impl Filter {
    fn accepts(self, mirror: &Mirror) -> bool {
        if mirror.latency.is_none() {
            return false;
        }
        match self {
            Filter::PingOnly => true,
            Filter::MinStatus(min) => mirror.status.meets(min),
        }
    }
}

/// Filter, sort by ascending latency and keep the first `top`.
/// The sort is stable, so equal latencies keep catalog order.
pub fn rank(mirrors: &[Mirror], filter: Filter, top: usize) -> Vec<Mirror> {
    let mut eligible: Vec<Mirror> = mirrors
        .iter()
        .filter(|m| filter.accepts(m))
        .cloned()
        .collect();

    eligible.sort_by_key(|m| m.latency);
    eligible.truncate(top);
    eligible
}
