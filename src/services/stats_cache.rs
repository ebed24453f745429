use dashmap::DashMap;
use uuid::Uuid;

/// Options assumed per question until a higher index is recorded.
const DEFAULT_OPTION_SLOTS: usize = 4;

/// Per-quiz vote-count matrix with a percentage projection.
///
/// Rows grow sparsely: recording beyond the current capacity expands the
/// matrix instead of failing, so the cache never needs the full question
/// count up front.
pub struct StatsCache {
    quizzes: DashMap<Uuid, QuizStats>,
}

#[derive(Debug, Default)]
struct QuizStats {
    counts: Vec<Vec<u64>>,
    totals: Vec<u64>,
}

impl QuizStats {
    fn with_questions(question_count: usize) -> Self {
        Self {
            counts: (0..question_count)
                .map(|_| vec![0; DEFAULT_OPTION_SLOTS])
                .collect(),
            totals: vec![0; question_count],
        }
    }

    fn ensure_question(&mut self, question_index: usize) {
        while self.counts.len() <= question_index {
            self.counts.push(vec![0; DEFAULT_OPTION_SLOTS]);
            self.totals.push(0);
        }
    }

    fn record(&mut self, question_index: usize, option_index: usize, increment: u64) {
        self.ensure_question(question_index);
        let row = &mut self.counts[question_index];
        if row.len() <= option_index {
            row.resize(option_index + 1, 0);
        }
        row[option_index] += increment;
        self.totals[question_index] += increment;
    }

    fn project(&self, question_index: usize) -> Vec<u32> {
        let Some(row) = self.counts.get(question_index) else {
            return vec![0; DEFAULT_OPTION_SLOTS];
        };
        let total = self.totals.get(question_index).copied().unwrap_or(0);

        row.iter()
            .map(|&count| {
                if total == 0 {
                    0
                } else {
                    ((count as f64 / total as f64) * 100.0).round() as u32
                }
            })
            .collect()
    }
}

impl StatsCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            quizzes: DashMap::new(),
        }
    }

    /// Pre-size the quiz's matrix; replaces any existing state.
    pub fn init_quiz(&self, quiz_id: Uuid, question_count: usize) {
        self.quizzes
            .insert(quiz_id, QuizStats::with_questions(question_count));
    }

    /// Whether the cache already holds state for the quiz.
    pub fn has_quiz(&self, quiz_id: Uuid) -> bool {
        self.quizzes.contains_key(&quiz_id)
    }

    /// Count votes for an option, creating quiz and slots as needed.
    pub fn record(
        &self,
        quiz_id: Uuid,
        question_index: usize,
        option_index: usize,
        increment: u64,
    ) {
        let mut stats = self.quizzes.entry(quiz_id).or_default();
        stats.record(question_index, option_index, increment);
    }

    /// Vote percentages per option, all zeros when nobody answered.
    pub fn project(&self, quiz_id: Uuid, question_index: usize) -> Vec<u32> {
        self.quizzes
            .get(&quiz_id)
            .map(|stats| stats.project(question_index))
            .unwrap_or_else(|| vec![0; DEFAULT_OPTION_SLOTS])
    }

    /// Number of recorded answers for a question.
    pub fn total_answers(&self, quiz_id: Uuid, question_index: usize) -> u64 {
        self.quizzes
            .get(&quiz_id)
            .and_then(|stats| stats.totals.get(question_index).copied())
            .unwrap_or(0)
    }

    /// Drop all cached state of a quiz.
    pub fn clear_quiz(&self, quiz_id: Uuid) {
        self.quizzes.remove(&quiz_id);
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_match_the_sum_of_counts() {
        let cache = StatsCache::new();
        let quiz = Uuid::new_v4();

        cache.record(quiz, 0, 0, 1);
        cache.record(quiz, 0, 2, 1);
        cache.record(quiz, 0, 2, 1);
        cache.record(quiz, 3, 1, 5);

        assert_eq!(cache.total_answers(quiz, 0), 3);
        assert_eq!(cache.total_answers(quiz, 3), 5);

        let stats = cache.quizzes.get(&quiz).unwrap();
        for (question_index, row) in stats.counts.iter().enumerate() {
            assert_eq!(row.iter().sum::<u64>(), stats.totals[question_index]);
        }
    }

    #[test]
    fn percentages_sum_to_roughly_one_hundred() {
        let cache = StatsCache::new();
        let quiz = Uuid::new_v4();

        cache.record(quiz, 0, 0, 1);
        cache.record(quiz, 0, 1, 1);
        cache.record(quiz, 0, 2, 1);

        let projection = cache.project(quiz, 0);
        let sum: u32 = projection.iter().sum();
        let tolerance = projection.len() as u32;
        assert!(sum.abs_diff(100) <= tolerance, "sum was {sum}");
    }

    #[test]
    fn empty_question_projects_all_zeros() {
        let cache = StatsCache::new();
        let quiz = Uuid::new_v4();

        assert_eq!(cache.project(quiz, 0), vec![0, 0, 0, 0]);

        cache.init_quiz(quiz, 2);
        assert_eq!(cache.project(quiz, 1), vec![0, 0, 0, 0]);
    }

    #[test]
    fn matrix_grows_sparsely_beyond_initial_capacity() {
        let cache = StatsCache::new();
        let quiz = Uuid::new_v4();

        cache.init_quiz(quiz, 1);
        cache.record(quiz, 6, 7, 2);

        assert_eq!(cache.total_answers(quiz, 6), 2);
        let projection = cache.project(quiz, 6);
        assert_eq!(projection.len(), 8);
        assert_eq!(projection[7], 100);
        // Untouched middle questions exist with zeroed rows.
        assert_eq!(cache.total_answers(quiz, 3), 0);
    }

    #[test]
    fn clear_evicts_the_quiz() {
        let cache = StatsCache::new();
        let quiz = Uuid::new_v4();

        cache.record(quiz, 0, 0, 1);
        assert!(cache.has_quiz(quiz));

        cache.clear_quiz(quiz);
        assert!(!cache.has_quiz(quiz));
        assert_eq!(cache.project(quiz, 0), vec![0, 0, 0, 0]);
    }
}
