use olfa_core::{ParseError, Pulse, parse_batch};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::config::ControllerConfig;

/// Ordered list of pulses to deliver, one per trial.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialList {
    pulses: Vec<Pulse>,
}

impl TrialList {
    pub fn new(pulses: Vec<Pulse>) -> Self {
        Self { pulses }
    }

    /// Parses a whitespace separated batch of pulse expressions.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse_batch(text).map(Self::new)
    }

    /// Builds the session list: every pulse repeated `repetitions` times,
    /// shuffled when the configuration asks for it.
    pub fn from_config(pulses: Vec<Pulse>, config: &ControllerConfig) -> Self {
        let mut list = Self::new(pulses).repeated(config.repetitions);
        if config.shuffle {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            list.shuffle(&mut rng);
        }
        list
    }

    pub fn repeated(self, times: usize) -> Self {
        let len = self.pulses.len();
        let pulses = self.pulses.into_iter().cycle().take(len * times).collect();
        Self { pulses }
    }

    pub fn shuffle<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.pulses.shuffle(rng);
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Pulse)> {
        self.pulses.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(list: &TrialList) -> Vec<String> {
        list.pulses().iter().map(Pulse::to_string).collect()
    }

    #[test]
    fn repeats_in_order() {
        let list = TrialList::parse("1=4 2=5").unwrap().repeated(2);
        assert_eq!(texts(&list), vec!["1=4", "2=5", "1=4", "2=5"]);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let pulses = TrialList::parse("1=1 1=2 1=3 1=4 1=5 1=6").unwrap();
        let config = ControllerConfig {
            shuffle: true,
            seed: Some(11),
            repetitions: 2,
            ..Default::default()
        };
        let a = TrialList::from_config(pulses.pulses().to_vec(), &config);
        let b = TrialList::from_config(pulses.pulses().to_vec(), &config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);

        let mut sorted = texts(&a);
        sorted.sort();
        let mut expected = texts(&pulses.repeated(2));
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn bad_batch_yields_no_list() {
        assert!(TrialList::parse("1=4 1=[5]4,2=[5]4").is_err());
    }
}
