//! Tempo counter: decides on which ticks a new row is due.
//!
//! The counter holds a budget in "tempo units". Each row adds
//! `60 * tick_rate * speed`, each tick removes `tempo * 24`, and a row is due
//! whenever the budget is used up. The accounting is exact integer
//! arithmetic so odd tempos never drift. With a tempo of 0 a row lasts
//! exactly `speed` ticks.

/// Row lengths taken in turn instead of a fixed speed
pub type Groove = Vec<u8>;

#[derive(Debug, Clone)]
pub struct TempoCounter {
    tempo: u16,
    speed: u8,
    groove: Option<Groove>,
    groove_position: usize,
    tick_rate: u32,
    budget: i64,
}

impl TempoCounter {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tempo: 150,
            speed: 6,
            groove: None,
            groove_position: 0,
            tick_rate: tick_rate.max(1),
            budget: 0,
        }
    }

    /// Start over with a row due on the next tick
    pub fn reset(&mut self, tempo: u16, speed: u8, groove: Option<Groove>) {
        self.tempo = tempo;
        self.speed = speed.max(1);
        self.groove = groove.filter(|g| !g.is_empty());
        self.groove_position = 0;
        self.budget = 0;
    }

    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        self.tick_rate = tick_rate.max(1);
    }

    pub fn set_tempo(&mut self, tempo: u16) {
        self.tempo = tempo;
    }

    /// Fixed speed; leaves groove mode
    pub fn set_speed(&mut self, speed: u8) {
        self.speed = speed.max(1);
        self.groove = None;
    }

    pub fn set_groove(&mut self, groove: Groove) {
        if groove.iter().all(|&s| s == 0) {
            return;
        }
        self.groove = Some(groove);
        self.groove_position = 0;
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn speed(&self) -> u8 {
        match &self.groove {
            Some(groove) => groove[self.groove_position % groove.len()],
            None => self.speed,
        }
    }

    pub fn groove_position(&self) -> Option<usize> {
        self.groove.as_ref().map(|_| self.groove_position)
    }

    fn decrement(&self) -> i64 {
        if self.tempo == 0 {
            60 * self.tick_rate as i64
        } else {
            self.tempo as i64 * 24
        }
    }

    /// Account for one tick
    pub fn tick(&mut self) {
        self.budget -= self.decrement();
    }

    pub fn can_step_row(&self) -> bool {
        self.budget <= 0
    }

    /// Start a new row: add its length and advance the groove
    pub fn step_row(&mut self) {
        let speed = self.speed().max(1);
        if let Some(groove) = &self.groove {
            self.groove_position = (self.groove_position + 1) % groove.len();
        }
        self.budget += 60 * self.tick_rate as i64 * speed as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tick `ticks` times, returning the ticks on which a row started
    fn run(counter: &mut TempoCounter, ticks: usize) -> Vec<usize> {
        let mut rows = Vec::new();
        for tick in 0..ticks {
            if counter.can_step_row() {
                counter.step_row();
                rows.push(tick);
            }
            counter.tick();
        }
        rows
    }

    #[test]
    fn default_tempo_is_six_ticks_per_row() {
        let mut counter = TempoCounter::new(60);
        counter.reset(150, 6, None);
        let rows = run(&mut counter, 60);
        assert_eq!(rows, (0..60).step_by(6).collect::<Vec<_>>());
    }

    #[test]
    fn odd_tempo_does_not_drift() {
        // 125 * 24 / (6 * 60) = 8.333 rows per second
        let mut counter = TempoCounter::new(60);
        counter.reset(125, 6, None);
        let five_minutes = 60 * 60 * 5;
        let rows = run(&mut counter, five_minutes);
        assert_eq!(rows.len(), 2500);
        // Row lengths only ever differ by the rounding remainder
        let lengths: Vec<usize> = rows.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(lengths.iter().all(|&l| l == 7 || l == 8));
    }

    #[test]
    fn zero_tempo_uses_speed_only() {
        let mut counter = TempoCounter::new(50);
        counter.reset(0, 3, None);
        let rows = run(&mut counter, 12);
        assert_eq!(rows, vec![0, 3, 6, 9]);
    }

    #[test]
    fn groove_alternates_and_wraps() {
        let mut counter = TempoCounter::new(60);
        counter.reset(150, 6, Some(vec![6, 5]));
        let rows = run(&mut counter, 34);
        assert_eq!(rows, vec![0, 6, 11, 17, 22, 28, 33]);
    }

    #[test]
    fn set_speed_leaves_groove() {
        let mut counter = TempoCounter::new(60);
        counter.reset(150, 6, Some(vec![4, 2]));
        assert_eq!(counter.groove_position(), Some(0));
        counter.set_speed(3);
        assert_eq!(counter.groove_position(), None);
        assert_eq!(counter.speed(), 3);

        counter.set_groove(vec![0, 0]);
        assert_eq!(counter.groove_position(), None);
    }
}
