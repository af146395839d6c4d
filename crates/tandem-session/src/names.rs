//! Random conversation names of the form `action-adjective-noun`.

use rand::Rng;

const ACTIONS: &[&str] = &[
    "running", "jumping", "walking", "skipping", "hopping", "flying", "swimming", "crawling",
    "sneaking", "sprinting", "dancing", "singing", "laughing",
];

const ADJECTIVES: &[&str] = &[
    "funny", "happy", "sad", "angry", "silly", "crazy", "sneaky", "sleepy", "hungry", "red",
    "blue", "green", "pink", "purple", "yellow", "orange",
];

const NOUNS: &[&str] = &[
    "cat", "dog", "rat", "mouse", "fish", "elephant", "dinosaur", "bird", "pelican", "dragon",
    "unicorn", "mermaid", "monster", "alien", "robot", "whale", "shark", "walrus", "octopus",
    "squid", "jellyfish", "starfish", "penguin", "seal",
];

/// Generate a random name such as `dancing-sleepy-walrus`.
pub fn generate_name() -> String {
    let mut rng = rand::rng();
    let mut pick = |words: &[&'static str]| words[rng.random_range(0..words.len())];
    let action = pick(ACTIONS);
    let adjective = pick(ADJECTIVES);
    let noun = pick(NOUNS);
    format!("{action}-{adjective}-{noun}")
}

/// Whether `name` looks like the output of [`generate_name`].
pub fn is_generated_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('-').collect();
    matches!(
        parts.as_slice(),
        [action, adjective, noun]
            if ACTIONS.contains(action) && ADJECTIVES.contains(adjective) && NOUNS.contains(noun)
    )
}
