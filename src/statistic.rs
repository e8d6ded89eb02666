use std::{ops::AddAssign, time::Duration};

#[derive(Debug, Default, Clone)]
pub struct SmtStatistic {
    pub num_sat_query: usize,
    pub num_valid_query: usize,
    pub num_unknown: usize,
    pub query_time: Duration,
}

impl SmtStatistic {
    #[inline]
    pub fn num_query(&self) -> usize {
        self.num_sat_query + self.num_valid_query
    }

    pub fn avg_query_time(&self) -> Duration {
        match self.num_query() {
            0 => Duration::ZERO,
            n => self.query_time / n as u32,
        }
    }
}

impl AddAssign<&SmtStatistic> for SmtStatistic {
    fn add_assign(&mut self, rhs: &SmtStatistic) {
        self.num_sat_query += rhs.num_sat_query;
        self.num_valid_query += rhs.num_valid_query;
        self.num_unknown += rhs.num_unknown;
        self.query_time += rhs.query_time;
    }
}

#[derive(Debug, Default, Clone)]
pub struct StarStatistic {
    pub num_transform: usize,
    pub num_fast_path: usize,
    pub num_exact: usize,
    pub num_approx: usize,
    pub num_outer_refuted: usize,

    pub num_augment: usize,
    pub num_merge: usize,
    pub num_shift_down: usize,
    pub num_offset_down: usize,
    pub max_linear_sets: usize,
}

impl StarStatistic {
    #[inline]
    pub fn num_saturate_step(&self) -> usize {
        self.num_merge + self.num_shift_down + self.num_offset_down
    }
}

impl AddAssign<&StarStatistic> for StarStatistic {
    fn add_assign(&mut self, rhs: &StarStatistic) {
        self.num_transform += rhs.num_transform;
        self.num_fast_path += rhs.num_fast_path;
        self.num_exact += rhs.num_exact;
        self.num_approx += rhs.num_approx;
        self.num_outer_refuted += rhs.num_outer_refuted;
        self.num_augment += rhs.num_augment;
        self.num_merge += rhs.num_merge;
        self.num_shift_down += rhs.num_shift_down;
        self.num_offset_down += rhs.num_offset_down;
        self.max_linear_sets = self.max_linear_sets.max(rhs.max_linear_sets);
    }
}
