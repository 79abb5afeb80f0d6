use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Number of sounds played per trial
pub const TARGET_COUNT: usize = 3;
/// Number of decoys mixed into the recall display
pub const DISTRACTOR_COUNT: usize = 3;
/// Smallest catalog that can produce a trial
pub const MIN_CATALOG_SIZE: usize = TARGET_COUNT + DISTRACTOR_COUNT;

pub type SoundId = u8;

/// Playback routine selector for a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum SoundKind {
    Dog,
    Cat,
    Bird,
    Cow,
    Bell,
    Drum,
    Piano,
    Trumpet,
    Whistle,
    CarHorn,
    Phone,
    DoorKnock,
    Clap,
    WaterDrop,
    Thunder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sound {
    pub id: SoundId,
    pub kind: SoundKind,
    pub name: &'static str,
}

impl Sound {
    pub const fn new(id: SoundId, kind: SoundKind, name: &'static str) -> Self {
        Self { id, kind, name }
    }
}

const STANDARD_SOUNDS: [Sound; 15] = [
    Sound::new(1, SoundKind::Dog, "Dog"),
    Sound::new(2, SoundKind::Cat, "Cat"),
    Sound::new(3, SoundKind::Bird, "Bird"),
    Sound::new(4, SoundKind::Cow, "Cow"),
    Sound::new(5, SoundKind::Bell, "Bell"),
    Sound::new(6, SoundKind::Drum, "Drum"),
    Sound::new(7, SoundKind::Piano, "Piano"),
    Sound::new(8, SoundKind::Trumpet, "Trumpet"),
    Sound::new(9, SoundKind::Whistle, "Whistle"),
    Sound::new(10, SoundKind::CarHorn, "Car horn"),
    Sound::new(11, SoundKind::Phone, "Phone"),
    Sound::new(12, SoundKind::DoorKnock, "Door knock"),
    Sound::new(13, SoundKind::Clap, "Clap"),
    Sound::new(14, SoundKind::WaterDrop, "Water drop"),
    Sound::new(15, SoundKind::Thunder, "Thunder"),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has {0} sounds, at least 6 are needed")]
    TooSmall(usize),
    #[error("sound id {0} appears more than once in the catalog")]
    DuplicateId(SoundId),
}

/// Fixed set of sounds a trial can draw from. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    sounds: Vec<Sound>,
}

impl Catalog {
    pub fn new(sounds: Vec<Sound>) -> Result<Self, CatalogError> {
        if sounds.len() < MIN_CATALOG_SIZE {
            return Err(CatalogError::TooSmall(sounds.len()));
        }
        let mut seen = HashSet::new();
        for sound in &sounds {
            if !seen.insert(sound.id) {
                return Err(CatalogError::DuplicateId(sound.id));
            }
        }
        Ok(Self { sounds })
    }

    /// The built-in 15 sound catalog
    pub fn standard() -> Self {
        Self {
            sounds: STANDARD_SOUNDS.to_vec(),
        }
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn get(&self, id: SoundId) -> Option<&Sound> {
        self.sounds.iter().find(|s| s.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Sounds drawn for a single trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialStimuli {
    /// Ground truth in playback order
    pub targets: Vec<Sound>,
    pub distractors: Vec<Sound>,
    /// Shuffled union of targets and distractors, frozen for the trial
    pub display_set: Vec<Sound>,
}

impl TrialStimuli {
    pub fn target_ids(&self) -> Vec<SoundId> {
        self.targets.iter().map(|s| s.id).collect()
    }

    pub fn is_target(&self, id: SoundId) -> bool {
        self.targets.iter().any(|s| s.id == id)
    }

    pub fn display_contains(&self, id: SoundId) -> bool {
        self.display_set.iter().any(|s| s.id == id)
    }
}

/// Draw targets, distractors and the display order for one trial.
///
/// Targets are sampled uniformly without replacement from the whole catalog,
/// distractors from what is left. The result depends only on `rng`, so a
/// seeded generator reproduces the same trial.
pub fn sample<R: Rng + ?Sized>(catalog: &Catalog, rng: &mut R) -> TrialStimuli {
    let targets: Vec<Sound> = catalog
        .sounds()
        .choose_multiple(rng, TARGET_COUNT)
        .copied()
        .collect();

    let remaining: Vec<Sound> = catalog
        .sounds()
        .iter()
        .filter(|s| !targets.contains(s))
        .copied()
        .collect();
    let distractors: Vec<Sound> = remaining
        .choose_multiple(rng, DISTRACTOR_COUNT)
        .copied()
        .collect();

    let mut display_set: Vec<Sound> = targets.iter().chain(distractors.iter()).copied().collect();
    display_set.shuffle(rng);

    TrialStimuli {
        targets,
        distractors,
        display_set,
    }
}
