use crate::errors::{DomainError, DomainResult};

/// DM 配对的有序用户对。
///
/// 不变量：`low < high`，两个 id 均为正数；与自己建 DM 是非法的。
/// `(a, b)` 与 `(b, a)` 归一化为同一个配对。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectChatPair {
    low: i64,
    high: i64,
}

impl DirectChatPair {
    pub fn of(a: i64, b: i64) -> DomainResult<Self> {
        if a <= 0 || b <= 0 {
            return Err(DomainError::validation("user_id", "必须 > 0"));
        }
        if a == b {
            return Err(DomainError::validation("user_id", "不能与自己建立 DM"));
        }
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_ordered_regardless_of_argument_order() {
        let forward = DirectChatPair::of(7, 3).unwrap();
        let reverse = DirectChatPair::of(3, 7).unwrap();
        assert_eq!(forward, reverse);
        assert_eq!(forward.low(), 3);
        assert_eq!(forward.high(), 7);
    }

    #[test]
    fn pair_rejects_self_dm() {
        assert!(DirectChatPair::of(5, 5).is_err());
    }

    #[test]
    fn pair_rejects_non_positive_ids() {
        assert!(DirectChatPair::of(0, 2).is_err());
        assert!(DirectChatPair::of(1, -4).is_err());
    }
}
