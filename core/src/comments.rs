//! Reply trees built from the flat comment list the API returns.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::types::Comment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

// Unlink replies onto a heap stack so deep threads drop without recursion.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.replies);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.replies);
        }
    }
}

/// Nest `comments` under their parents, keeping input order among siblings.
/// A comment whose parent is absent from the list becomes a root.
pub fn nest(comments: Vec<Comment>) -> Vec<CommentNode> {
    let ids: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();
    let mut roots = Vec::new();
    let mut children: HashMap<Uuid, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match comment.parent_id {
            Some(parent) if parent != comment.id && ids.contains(&parent) => {
                children.entry(parent).or_default().push(comment)
            }
            _ => roots.push(comment),
        }
    }

    let mut tree: Vec<CommentNode> = Vec::with_capacity(roots.len());
    for root in roots {
        build(root, &mut children, &mut tree);
    }

    // Parent cycles leave entries behind; surface them as roots.
    let mut leftovers: Vec<Comment> = children.into_values().flatten().collect();
    leftovers.sort_by_key(|c| c.id);
    tree.extend(leftovers.into_iter().map(|comment| CommentNode {
        comment,
        replies: Vec::new(),
    }));
    tree
}

/// Build the subtree under `root` and push it onto `out`.
///
/// Walks preorder with an explicit stack, then assembles nodes in reverse so
/// every reply is finished before its parent.
fn build(root: Comment, children: &mut HashMap<Uuid, Vec<Comment>>, out: &mut Vec<CommentNode>) {
    let mut order: Vec<(Comment, Option<usize>)> = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((comment, parent)) = stack.pop() {
        let index = order.len();
        if let Some(replies) = children.remove(&comment.id) {
            stack.extend(replies.into_iter().rev().map(|reply| (reply, Some(index))));
        }
        order.push((comment, parent));
    }

    let mut replies: Vec<Vec<CommentNode>> = (0..order.len()).map(|_| Vec::new()).collect();
    for (index, (comment, parent)) in order.into_iter().enumerate().rev() {
        let mut own = std::mem::take(&mut replies[index]);
        own.reverse();
        let node = CommentNode {
            comment,
            replies: own,
        };
        match parent {
            Some(parent) => replies[parent].push(node),
            None => out.push(node),
        }
    }
}

/// Depth-first walk yielding each comment with its depth (roots are 0).
pub fn flatten(tree: &[CommentNode]) -> Vec<(usize, &Comment)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &CommentNode)> = tree.iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, &node.comment));
        stack.extend(node.replies.iter().rev().map(|n| (depth + 1, n)));
    }
    out
}

pub fn count(tree: &[CommentNode]) -> usize {
    let mut stack: Vec<&CommentNode> = tree.iter().collect();
    let mut total = 0;
    while let Some(node) = stack.pop() {
        total += 1;
        stack.extend(node.replies.iter());
    }
    total
}
