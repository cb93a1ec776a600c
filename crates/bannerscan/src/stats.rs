/// Single-writer counters, mutated only from the reactor thread.
///
/// `admission_failures` is not part of the distilled counter set but falls
/// out of the conservation property every admitted target must satisfy:
/// `init_connected_hosts == connected_hosts + conn_timed_out + admission_failures`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub found: u64,
    pub init_connected_hosts: u64,
    pub connected_hosts: u64,
    pub conn_timed_out: u64,
    pub read_timed_out: u64,
    pub timed_out: u64,
    pub completed_hosts: u64,
    pub admission_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_zero() {
        let s = Stats::default();
        assert_eq!(s.found, 0);
        assert_eq!(s.timed_out, 0);
        assert_eq!(s.admission_failures, 0);
    }
}
