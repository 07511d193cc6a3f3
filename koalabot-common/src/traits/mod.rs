pub mod repository_traits;

pub use repository_traits::{
    DurableStore,
    LeaderboardRepository,
    MessageCountRepository,
    StreakEventRepository,
};
