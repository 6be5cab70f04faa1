use editor_core_projection::{MasterDocument, ProjectionDocument, Region};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y', '\n', 'é', '中'];

fn random_text(rng: &mut StdRng) -> String {
    let len = rng.gen_range(0..4);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

fn random_region(rng: &mut StdRng, len: usize) -> Region {
    let offset = rng.gen_range(0..=len);
    let length = rng.gen_range(0..=(len - offset).min(8));
    Region::new(offset, length)
}

/// Segments tile the projection, fragments are sorted and apart, and the projection text is
/// the master text under the fragments.
fn assert_well_formed(doc: &ProjectionDocument, master: &MasterDocument, step: usize) {
    let fragments = doc.fragments();
    let segments = doc.segments();
    assert_eq!(fragments.len(), segments.len(), "step {step}");

    let mut image_offset = 0;
    for (fragment, segment) in fragments.iter().zip(&segments) {
        assert_eq!(segment.offset, image_offset, "step {step}");
        assert_eq!(segment.length, fragment.length, "step {step}");
        assert!(fragment.end() <= master.len(), "step {step}");
        image_offset += segment.length;
    }
    for pair in fragments.windows(2) {
        assert!(pair[0].end() < pair[1].offset, "step {step}: {fragments:?}");
    }
    if fragments.len() > 1 {
        assert!(fragments.iter().all(|f| f.length > 0), "step {step}");
    }

    let expected: String = fragments
        .iter()
        .map(|fragment| master.get(*fragment).unwrap())
        .collect();
    assert_eq!(doc.len(), image_offset, "step {step}");
    assert_eq!(doc.text(), expected, "step {step}");
    assert!(!doc.is_broken(), "step {step}");
}

fn run(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut master = MasterDocument::new("The quick brown fox\njumps over\nthe lazy dog.");
    let mut doc = ProjectionDocument::new();

    for step in 0..steps {
        match rng.gen_range(0..6) {
            0 => {
                let region = random_region(&mut rng, master.len());
                doc.add_master_range(&master, region.offset, region.length)
                    .unwrap();
            }
            1 => {
                let candidates: Vec<Region> = doc
                    .fragments()
                    .into_iter()
                    .filter(|fragment| fragment.length > 0)
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                let fragment = candidates[rng.gen_range(0..candidates.len())];
                let offset = fragment.offset + rng.gen_range(0..fragment.length);
                let length = rng.gen_range(1..=fragment.end() - offset);
                doc.remove_master_range(&master, offset, length).unwrap();
            }
            2 | 3 => {
                let region = random_region(&mut rng, master.len());
                let text = random_text(&mut rng);
                doc.replace_master(&mut master, region.offset, region.length, &text)
                    .unwrap();
            }
            4 => {
                let region = random_region(&mut rng, doc.len());
                let text = random_text(&mut rng);
                doc.replace(&mut master, region.offset, region.length, &text)
                    .unwrap();
            }
            _ => {
                if rng.gen_bool(0.2) {
                    let region = random_region(&mut rng, master.len());
                    doc.replace_master_ranges(&master, region.offset, region.length)
                        .unwrap();
                } else {
                    let auto_expand = !doc.is_auto_expanding();
                    doc.set_auto_expand(auto_expand);
                }
            }
        }
        assert_well_formed(&doc, &master, step);
    }
}

#[test]
fn test_random_edits_keep_the_projection_well_formed() {
    for seed in [1, 7, 42, 2024] {
        run(seed, 400);
    }
}

#[test]
fn test_projected_regions_cover_the_fragments() {
    let mut rng = StdRng::seed_from_u64(99);
    let master = MasterDocument::new("0123456789abcdefghijklmnopqrstuvwxyz");
    let mut doc = ProjectionDocument::new();
    for _ in 0..6 {
        let region = random_region(&mut rng, master.len());
        doc.add_master_range(&master, region.offset, region.length)
            .unwrap();
    }

    let all = Region::new(0, master.len());
    let projected = doc
        .projected_master_regions(&master, all.offset, all.length)
        .unwrap()
        .unwrap_or_default();
    let unprojected = doc
        .unprojected_master_regions(&master, all.offset, all.length)
        .unwrap();

    let nonempty: Vec<Region> = doc
        .fragments()
        .into_iter()
        .filter(|fragment| fragment.length > 0)
        .collect();
    assert_eq!(
        projected
            .iter()
            .copied()
            .filter(|region| region.length > 0)
            .collect::<Vec<_>>(),
        nonempty
    );

    let covered: usize = nonempty.iter().map(|region| region.length).sum::<usize>()
        + unprojected.iter().map(|region| region.length).sum::<usize>();
    assert_eq!(covered, master.len());
}
