// Statistical models: one-way ANOVA with Tukey comparisons, binomial
// regression, and scenario evaluation on fitted models.

pub mod anova;
pub mod distribution;
pub mod frame;
pub mod glm;
pub mod scenario;
pub mod tukey;
