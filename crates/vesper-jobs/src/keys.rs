use crate::record::Priority;

/// Namespaced key layout shared by every process using the same prefix
///
/// ```text
/// {prefix}:queue:{queue}:{priority}   ready list
/// {prefix}:scheduled                  delayed/retrying ids scored by due epoch seconds
/// {prefix}:processing:{queue}         ids currently owned by a worker
/// {prefix}:dead:{queue}               dead-letter list
/// {prefix}:job:{id}                   job record (JSON, fixed TTL)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ready(&self, queue: &str, priority: Priority) -> String {
        format!("{}:queue:{}:{}", self.prefix, queue, priority.as_str())
    }

    /// Ready lists of `queue` in poll order (high first)
    pub fn ready_all(&self, queue: &str) -> Vec<String> {
        Priority::ALL
            .iter()
            .map(|priority| self.ready(queue, *priority))
            .collect()
    }

    pub fn scheduled(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    pub fn processing(&self, queue: &str) -> String {
        format!("{}:processing:{}", self.prefix, queue)
    }

    pub fn dead(&self, queue: &str) -> String {
        format!("{}:dead:{}", self.prefix, queue)
    }

    pub fn job(&self, id: &str) -> String {
        format!("{}:job:{}", self.prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_lists_in_poll_order() {
        let keys = Keyspace::new("vesper");
        assert_eq!(
            keys.ready_all("webhooks"),
            vec![
                "vesper:queue:webhooks:high",
                "vesper:queue:webhooks:normal",
                "vesper:queue:webhooks:low",
            ]
        );
    }

    #[test]
    fn test_prefix_isolates_instances() {
        let a = Keyspace::new("tenant-a");
        let b = Keyspace::new("tenant-b");
        assert_ne!(a.job("1"), b.job("1"));
        assert_ne!(a.scheduled(), b.scheduled());
    }
}
