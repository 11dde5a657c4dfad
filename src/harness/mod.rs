pub mod scenario;
pub mod template;
pub mod types;

pub use scenario::ScenarioRunner;
pub use template::{ResolutionError, ResolveContext, lookup};
pub use types::{
    AssertionCheck, Expectation, HarnessError, HarnessResult, JsonAssertion, RequestTemplate,
    RunPolicy, Scenario, StatusExpectation, Step,
};
