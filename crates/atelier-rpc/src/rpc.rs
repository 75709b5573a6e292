use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use atelier_engine::{AuctionHouse, HouseError, SignedSubmission};
use atelier_store::PredictionDirection;

#[derive(Deserialize)]
struct MintRequest {
    creator: String,
    #[serde(default)]
    name: String,
    uri: String,
}

#[derive(Deserialize)]
struct JoinRequest {
    creator: String,
    asset: String,
}

#[derive(Deserialize)]
struct JoinConfirmRequest {
    creator: String,
    asset: String,
    signature: String,
}

#[derive(Deserialize)]
struct FreeVoteRequest {
    voter: String,
    candidate: String,
}

#[derive(Deserialize)]
struct PaidVoteRequest {
    voter: String,
    candidate: String,
    count: u64,
}

#[derive(Deserialize)]
struct PaidVoteConfirmRequest {
    voter: String,
    candidate: String,
    count: u64,
    signature: String,
}

#[derive(Deserialize)]
struct BidRequest {
    bidder: String,
    epoch_number: u64,
    amount: u64,
}

#[derive(Deserialize)]
struct BidConfirmRequest {
    bidder: String,
    epoch_number: u64,
    amount: u64,
    signature: String,
}

#[derive(Deserialize)]
struct PredictRequest {
    voter: String,
    candidate: String,
    direction: PredictionDirection,
}

#[derive(Deserialize)]
struct WithdrawRequest {
    creator: String,
    asset: String,
}

#[derive(Deserialize)]
struct ClaimRequest {
    voter: String,
}

#[derive(Deserialize)]
struct AuctionQuery {
    epoch: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn reply_result<T: Serialize>(result: Result<T, HouseError>) -> impl Reply {
    match result {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                error!("infrastructure failure serving request: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            warp::reply::with_status(
                warp::reply::json(&ErrorBody { error: e.to_string() }),
                status,
            )
        }
    }
}

fn with_house(
    house: Arc<AuctionHouse>,
) -> impl Filter<Extract = (Arc<AuctionHouse>,), Error = Infallible> + Clone {
    warp::any().map(move || house.clone())
}

/// The full route tree. Representative surface, not an admin API.
pub fn routes(
    house: Arc<AuctionHouse>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&"ok"));

    let mint = warp::path!("mint")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: MintRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.mint_quote(&req.creator, &req.name, &req.uri).await)
        });

    let mint_confirm = warp::path!("mint" / "confirm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: SignedSubmission, house: Arc<AuctionHouse>| async move {
            reply_result(house.mint_confirm(&req.identifier, &req.signature).await)
        });

    let join = warp::path!("join")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: JoinRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.join_quote(&req.creator, &req.asset).await)
        });

    let join_confirm = warp::path!("join" / "confirm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: JoinConfirmRequest, house: Arc<AuctionHouse>| async move {
            reply_result(
                house
                    .join_confirm(&req.creator, &req.asset, &req.signature)
                    .await,
            )
        });

    let withdraw = warp::path!("withdraw")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: WithdrawRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.withdraw(&req.creator, &req.asset).await)
        });

    let vote = warp::path!("vote")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: FreeVoteRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.free_vote(&req.voter, &req.candidate).await)
        });

    let vote_paid = warp::path!("vote-paid")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: PaidVoteRequest, house: Arc<AuctionHouse>| async move {
            reply_result(
                house
                    .paid_vote_quote(&req.voter, &req.candidate, req.count)
                    .await,
            )
        });

    let vote_confirm = warp::path!("vote" / "confirm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: PaidVoteConfirmRequest, house: Arc<AuctionHouse>| async move {
            reply_result(
                house
                    .paid_vote_confirm(&req.voter, &req.candidate, req.count, &req.signature)
                    .await,
            )
        });

    let bid = warp::path!("bid")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: BidRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.bid_quote(&req.bidder, req.epoch_number, req.amount).await)
        });

    let bid_confirm = warp::path!("bid" / "confirm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: BidConfirmRequest, house: Arc<AuctionHouse>| async move {
            reply_result(
                house
                    .bid_confirm(&req.bidder, req.epoch_number, req.amount, &req.signature)
                    .await,
            )
        });

    let predict = warp::path!("predict")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: PredictRequest, house: Arc<AuctionHouse>| async move {
            reply_result(
                house
                    .submit_prediction(&req.voter, &req.candidate, req.direction)
                    .await,
            )
        });

    let claim = warp::path!("rewards" / "claim")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_house(house.clone()))
        .then(|req: ClaimRequest, house: Arc<AuctionHouse>| async move {
            reply_result(house.claim_rewards(&req.voter).await)
        });

    let epoch = warp::path!("epoch")
        .and(warp::get())
        .and(with_house(house.clone()))
        .then(|house: Arc<AuctionHouse>| async move {
            reply_result(house.store().current_epoch().map_err(HouseError::from))
        });

    let auction = warp::path!("auction")
        .and(warp::get())
        .and(warp::query())
        .and(with_house(house.clone()))
        .then(|query: AuctionQuery, house: Arc<AuctionHouse>| async move {
            reply_result(house.auction_status(query.epoch))
        });

    let candidates = warp::path!("candidates")
        .and(warp::get())
        .and(with_house(house.clone()))
        .then(|house: Arc<AuctionHouse>| async move {
            reply_result(house.store().eligible_candidates().map_err(HouseError::from))
        });

    let leaderboard = warp::path!("leaderboard")
        .and(warp::get())
        .and(with_house(house.clone()))
        .then(|house: Arc<AuctionHouse>| async move { reply_result(house.leaderboard()) });

    let rewards = warp::path!("rewards" / String)
        .and(warp::get())
        .and(with_house(house))
        .then(|wallet: String, house: Arc<AuctionHouse>| async move {
            reply_result(house.prediction_stats(&wallet))
        });

    health
        .or(mint)
        .or(mint_confirm)
        .or(join)
        .or(join_confirm)
        .or(withdraw)
        .or(vote_paid)
        .or(vote_confirm)
        .or(vote)
        .or(bid_confirm)
        .or(bid)
        .or(predict)
        .or(claim)
        .or(epoch)
        .or(auction)
        .or(candidates)
        .or(leaderboard)
        .or(rewards)
}
