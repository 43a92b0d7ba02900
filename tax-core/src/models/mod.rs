mod assessment;
mod taxpayer;

pub use assessment::{
    Assessment, AssessmentFigures, AssessmentFilter, AssessmentInput, NewAssessment,
};
pub use taxpayer::{NewTaxpayer, Taxpayer};
