use rocket::{serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        auth::{AuthToken, Student},
        ballot::{BallotBox, BallotReceipt, BallotSubmission},
        roster::EligibilityOracle,
    },
};

pub fn routes() -> Vec<Route> {
    routes![cast_ballot]
}

/// Cast a ballot as the authenticated student. The identity comes from the
/// session, never from the body.
#[post("/votes", data = "<submission>", format = "json")]
async fn cast_ballot(
    token: AuthToken<Student>,
    submission: Json<BallotSubmission>,
    ballot_box: BallotBox,
    oracle: &State<EligibilityOracle>,
) -> Result<Json<BallotReceipt>> {
    let proof = ballot_box
        .cast(oracle.snapshot(), &token.id, &submission)
        .await?;
    Ok(Json(BallotReceipt {
        token: proof.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use mongodb::{bson::Document, Database};
    use rocket::{
        futures::{future::join_all, TryStreamExt},
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json,
    };

    use crate::model::{
        activity::{ActivityRegistry, ActivitySpec},
        auth::Admin,
        ballot::{Ballot, Participation, Remark, RemarkedOption, Selections},
        mongodb::{Coll, Id},
        vote_option::{OptionCatalog, OptionSpec, VoteOption},
    };
    use crate::session_cookie;

    use super::*;

    /// Insert an activity from `spec` with options named `names`.
    async fn setup_activity(client: &Client, spec: ActivitySpec, names: &[&str]) -> (Id, Vec<Id>) {
        let registry = ActivityRegistry::new(
            client.rocket().state::<mongodb::Client>().unwrap(),
            client.rocket().state::<Database>().unwrap(),
            8,
        );
        let catalog = OptionCatalog::new(
            client.rocket().state::<mongodb::Client>().unwrap(),
            client.rocket().state::<Database>().unwrap(),
            8,
        );
        let activity = registry.create(spec).await.unwrap();
        let mut option_ids = Vec::new();
        for name in names {
            let option = catalog
                .create(
                    activity.id,
                    OptionSpec {
                        name: name.to_string(),
                        description: None,
                    },
                )
                .await
                .unwrap();
            option_ids.push(option.id);
        }
        (activity.id, option_ids)
    }

    async fn load_roster(client: &Client, content: &str) {
        client
            .rocket()
            .state::<EligibilityOracle>()
            .unwrap()
            .replace(content)
            .await
            .unwrap();
    }

    async fn submit<'c>(
        client: &'c Client,
        identity: &str,
        submission: &BallotSubmission,
    ) -> LocalResponse<'c> {
        client
            .post(uri!(cast_ballot))
            .header(ContentType::JSON)
            .cookie(session_cookie::<Student>(client, identity))
            .body(serde_json::to_string(submission).unwrap())
            .dispatch()
            .await
    }

    async fn error_kind(response: LocalResponse<'_>) -> String {
        let json: serde_json::Value = response.into_json().await.unwrap();
        json["error"].as_str().unwrap().to_string()
    }

    #[backend_test]
    async fn vote_once_then_already_voted(client: Client, ballots: Coll<Ballot>) {
        load_roster(&client, "S1\nS2\n").await;
        let (activity, options) =
            setup_activity(&client, ActivitySpec::open_choose_one(), &["O1", "O2"]).await;

        let submission = BallotSubmission::choose_one(activity, options[0]);
        let response = submit(&client, "S1", &submission).await;
        assert_eq!(Status::Ok, response.status());
        let receipt: BallotReceipt = response.into_json().await.unwrap();
        assert_eq!(receipt.token.len(), 26);

        let response = submit(&client, "S1", &submission).await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_kind(response).await, "AlreadyVoted");

        let stored: Vec<Ballot> = ballots.find(None, None).await.unwrap().try_collect().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].token.as_str(), receipt.token);
    }

    #[backend_test]
    async fn concurrent_submissions_admit_one(
        client: Client,
        ballots: Coll<Ballot>,
        participations: Coll<Participation>,
    ) {
        // Retries and conflicts happen deep in the commit path, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["campus_vote_backend"], None, None);

        load_roster(&client, "S1\n").await;
        let (activity, options) =
            setup_activity(&client, ActivitySpec::open_choose_one(), &["O1", "O2", "O3"]).await;

        let submissions: Vec<_> = (0..6)
            .map(|i| BallotSubmission::choose_one(activity, options[i % options.len()]))
            .collect();
        let responses = join_all(submissions.iter().map(|s| submit(&client, "S1", s))).await;

        let mut accepted = 0;
        for response in responses {
            if response.status() == Status::Ok {
                accepted += 1;
            } else {
                assert_eq!(Status::BadRequest, response.status());
                assert_eq!(error_kind(response).await, "AlreadyVoted");
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 1);
        assert_eq!(participations.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn ballots_carry_no_identity(client: Client, db: Database) {
        load_roster(&client, "S1\n").await;
        let (activity, options) =
            setup_activity(&client, ActivitySpec::open_choose_all(), &["M1", "M2"]).await;

        let submission = BallotSubmission::choose_all(
            activity,
            [(options[0], "support"), (options[1], "NEUTRAL")],
        );
        let response = submit(&client, "S1", &submission).await;
        assert_eq!(Status::Ok, response.status());
        let receipt: BallotReceipt = response.into_json().await.unwrap();

        let ballot = db
            .collection::<Document>("ballots")
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();
        let keys: Vec<_> = ballot.keys().cloned().collect();
        assert_eq!(keys, vec!["_id", "activity_id", "rule", "selections"]);
        assert!(!ballot.to_string().contains("S1"));

        let participation = db
            .collection::<Document>("participations")
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participation.keys().count(), 1);
        assert!(!participation.to_string().contains(&receipt.token));

        let stored: Ballot = Coll::<Ballot>::from_db(&db)
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.selections,
            Selections::ChooseAll(vec![
                RemarkedOption {
                    option_id: options[0],
                    remark: Remark::Support,
                },
                RemarkedOption {
                    option_id: options[1],
                    remark: Remark::Neutral,
                },
            ])
        );
    }

    #[backend_test]
    async fn refusals_leave_no_trace(
        client: Client,
        ballots: Coll<Ballot>,
        participations: Coll<Participation>,
    ) {
        load_roster(&client, "S1\n").await;
        let (open, open_options) =
            setup_activity(&client, ActivitySpec::open_choose_one(), &["O1"]).await;
        let (upcoming, upcoming_options) =
            setup_activity(&client, ActivitySpec::upcoming_choose_one(), &["O1"]).await;
        let (closed, closed_options) =
            setup_activity(&client, ActivitySpec::closed_choose_one(), &["O1"]).await;
        let (motions, motion_options) =
            setup_activity(&client, ActivitySpec::open_choose_all(), &["M1", "M2"]).await;

        let cases = [
            ("S2", BallotSubmission::choose_one(open, open_options[0]), Status::Forbidden, "NotEligible"),
            ("S1", BallotSubmission::choose_one(Id::new(), open_options[0]), Status::NotFound, "ActivityNotFound"),
            ("S1", BallotSubmission::choose_one("not-an-id", open_options[0]), Status::NotFound, "ActivityNotFound"),
            ("S1", BallotSubmission::choose_one(open, Id::new()), Status::BadRequest, "InvalidOptions"),
            ("S1", BallotSubmission::choose_one(open, motion_options[0]), Status::BadRequest, "InvalidOptions"),
            ("S1", BallotSubmission::choose_one(upcoming, upcoming_options[0]), Status::BadRequest, "NotStarted"),
            ("S1", BallotSubmission::choose_one(closed, closed_options[0]), Status::BadRequest, "VotingEnded"),
            (
                "S1",
                BallotSubmission::choose_all(open, [(open_options[0], "support")]),
                Status::BadRequest,
                "RuleMismatch",
            ),
            ("S1", BallotSubmission::choose_one(motions, motion_options[0]), Status::BadRequest, "RuleMismatch"),
            (
                "S1",
                BallotSubmission::choose_all(motions, [(motion_options[0], "support")]),
                Status::BadRequest,
                "InvalidOptions",
            ),
            (
                "S1",
                BallotSubmission::choose_all(motions, [(motion_options[0], "maybe"), (motion_options[1], "support")]),
                Status::BadRequest,
                "InvalidRemark",
            ),
            (
                "S1",
                BallotSubmission {
                    rule: "ranked".to_string(),
                    ..BallotSubmission::choose_one(open, open_options[0])
                },
                Status::BadRequest,
                "InvalidRule",
            ),
            (
                "S1",
                BallotSubmission {
                    choose_one: None,
                    ..BallotSubmission::choose_one(open, open_options[0])
                },
                Status::BadRequest,
                "MissingSelection",
            ),
        ];

        for (identity, submission, status, kind) in cases {
            let response = submit(&client, identity, &submission).await;
            assert_eq!(status, response.status(), "{kind}");
            assert_eq!(error_kind(response).await, kind);
        }

        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(participations.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn students_only(client: Client) {
        load_roster(&client, "admin1\n").await;
        let (activity, options) =
            setup_activity(&client, ActivitySpec::open_choose_one(), &["O1"]).await;
        let body = serde_json::to_string(&BallotSubmission::choose_one(activity, options[0])).unwrap();

        let response = client
            .post(uri!(cast_ballot))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .post(uri!(cast_ballot))
            .header(ContentType::JSON)
            .cookie(session_cookie::<Admin>(&client, "admin1"))
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "Forbidden");
    }

    #[backend_test]
    async fn malformed_bodies_share_error_shape(client: Client, ballots: Coll<Ballot>) {
        load_roster(&client, "S1\n").await;
        let (activity, options) =
            setup_activity(&client, ActivitySpec::open_choose_all(), &["O1"]).await;
        let missing_rule = format!(
            r#"{{"activity_id": "{activity}", "choose_one": "{}"}}"#,
            options[0]
        );
        let numeric_remark = format!(
            r#"{{"activity_id": "{activity}", "rule": "CHOOSE_ALL", "choose_all": [{{"option_id": "{}", "remark": 5}}]}}"#,
            options[0]
        );

        for body in [missing_rule, numeric_remark] {
            let response = client
                .post(uri!(cast_ballot))
                .header(ContentType::JSON)
                .cookie(session_cookie::<Student>(&client, "S1"))
                .body(&body)
                .dispatch()
                .await;
            assert_eq!(Status::UnprocessableEntity, response.status(), "{body}");
            let reply: serde_json::Value = response.into_json().await.unwrap();
            assert_eq!(reply["error"], "MalformedRequest", "{body}");
            assert!(reply["message"].is_string());
        }

        let response = client
            .post(uri!(cast_ballot))
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        let reply: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(reply["error"], "Unauthorized");

        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn option_ownership_checked(client: Client, options: Coll<VoteOption>) {
        load_roster(&client, "S1\n").await;
        let (activity, _) = setup_activity(&client, ActivitySpec::open_choose_one(), &["O1"]).await;

        // An option pointing at the activity but never linked to it.
        let stray = VoteOption::new(activity, "Stray", None);
        options.insert_one(&stray, None).await.unwrap();

        let response = submit(&client, "S1", &BallotSubmission::choose_one(activity, stray.id)).await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_kind(response).await, "InvalidOptions");
    }
}
