//! # cfsync - synchronize groups of CloudFormation stacks
//!
//! One configuration file describes a set of stacks: which template each of them uses, which
//! parameters they get and how they depend on each other. `cfsync` brings the stacks in line with
//! that description and leaves all state with the provider.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `cfsync` works internally.
//!
//! ### Sentinels
//!
//! Plain YAML/JSON cannot express "the output `VpcId` of stack `vpc`" or "the ciphertext below,
//! decrypted". Strings (and template mapping keys) that start with a sentinel carry these
//! instructions:
//!
//! | where               | sentinel                         | meaning                                   |
//! |---------------------|----------------------------------|-------------------------------------------|
//! | stack parameter     | `\|ref\|stack.output`            | output of another stack                   |
//! | stack parameter     | `\|keepOrUse\|default`           | current value of the parameter or default |
//! | stack parameter     | `\|kms\|ciphertext`              | decrypted with the key service            |
//! | stack parameter     | `\|file\|url`                    | contents of a local file or object        |
//! | stack parameter     | `\|latestTaupageAmi\|`           | newest Taupage image id                   |
//! | template leaf value | `\|ref\|Name`, `\|getatt\|R.A`   | `Ref` and `Fn::GetAtt`                    |
//! | template key        | `\|join\|sep`                    | `Fn::Join` with the given separator       |
//! | template key        | `@TaupageUserData@`              | yaml user data with Taupage preamble      |
//! | template key        | `@YamlUserData@`                 | yaml user data                            |
//!
//! The grammar lives in [reference]. Sentinels are matched case-insensitively.
//!
//! ### Ordering
//!
//! `|ref|` parameters are the only dependency edges between stacks ([dependency]). References to
//! stacks outside of the configuration are assumed to exist already and do not constrain the order.
//! The graph yields either a total order (sequential mode) or waves of stacks that do not depend on
//! each other (parallel mode).
//!
//! ### A single stack
//!
//! For every stack the [orchestrator]:
//!
//! - loads the template ([services::FileLoader]) and rewrites all template sentinels into
//!   intrinsics ([template])
//! - resolves the parameters ([parameters]), command line overrides win
//! - builds an immutable [stack::Stack]
//! - creates or updates it through the [provider::StackProvider], an update that would change
//!   nothing is not an error
//! - follows the stack events until the action has finished ([waiter])
//!
//! ### Collaborators
//!
//! The provider's SDK, the key service, the object store and the image catalog are traits
//! ([provider], [services]) implemented outside of this crate. Throttled provider calls are retried
//! with exponential backoff ([provider::Retrying]).
pub mod commands;
pub mod config;
pub mod dependency;
pub mod error;
pub mod orchestrator;
pub mod overrides;
pub mod parameters;
pub mod provider;
pub mod reference;
pub mod services;
pub mod stack;
pub mod template;
mod util;
pub mod value;
mod visit;
pub mod waiter;

pub use error::{Error, Result};
